//! econet-bridge - econet24 boiler telemetry for Domoticz
//!
//! Logs into the econet24 cloud, polls boiler temperature and DHW pump
//! state on a fixed heartbeat, and republishes them as Domoticz devices.

mod config;
mod econet;
mod error;
mod host;
mod plugin;

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogLevel;
use crate::host::DomoticzClient;
use crate::plugin::{EconetPlugin, Plugin};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = config::Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.plugin.log_level.filter_directive().into()),
        )
        .init();

    tracing::info!("Starting econet-bridge...");
    if config.plugin.log_level != LogLevel::Normal {
        config.log_summary();
    }

    let host_client = reqwest::Client::builder()
        .timeout(config.plugin.request_timeout())
        .build()?;
    let host = Arc::new(DomoticzClient::new(host_client, &config.host));

    let mut plugin = EconetPlugin::new(&config, host)?;

    let period = config.plugin.heartbeat_interval();
    tracing::info!("Update interval set to {}s", period.as_secs());

    plugin.on_start().await;
    run(&mut plugin, period).await;
    plugin.on_stop().await;

    Ok(())
}

/// Drive heartbeats until Ctrl-C. A tick always completes before the next
/// one is scheduled.
async fn run<P: Plugin>(plugin: &mut P, period: std::time::Duration) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = timer.tick() => plugin.on_heartbeat().await,
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }
}
