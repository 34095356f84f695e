//! econet24 → host bridge plugin

use std::sync::Arc;

use async_trait::async_trait;

use super::{HeartbeatState, Plugin, TickOutcome};
use crate::config::Config;
use crate::econet::{build_http_client, Credentials, SessionManager, TelemetryPoller, TelemetrySample};
use crate::error::{BridgeError, Result};
use crate::host::{format_temperature, switch_value, DeviceHost, DeviceKind, DeviceSpec};

const HEATER_DEVICE: &str = "Heater Temperature";
const DHW_DEVICE: &str = "DHW Temperature";
const PUMP_DEVICE: &str = "DHW Pump";
/// Shown on a freshly created heater device until the first poll lands
const INITIAL_HEATER_TEMP: &str = "50";

#[derive(Debug, Clone, Copy)]
struct DeviceOptions {
    dhw: bool,
    pump: bool,
    persist_pump_variable: bool,
}

#[derive(Debug, Default)]
struct DeviceIndex {
    heater: Option<u64>,
    dhw: Option<u64>,
    pump: Option<u64>,
}

pub struct EconetPlugin {
    name: String,
    credentials: Credentials,
    sessions: SessionManager,
    poller: TelemetryPoller,
    host: Arc<dyn DeviceHost>,
    options: DeviceOptions,
    devices: DeviceIndex,
    last_sample: Option<TelemetrySample>,
    state: HeartbeatState,
    failure_threshold: u32,
    consecutive_failures: u32,
    degraded: bool,
}

impl EconetPlugin {
    pub fn new(config: &Config, host: Arc<dyn DeviceHost>) -> Result<Self> {
        let http_client = build_http_client(config.plugin.request_timeout())?;
        let vendor = &config.vendor;

        Ok(Self {
            name: config.plugin.name.clone(),
            credentials: vendor.credentials(),
            sessions: SessionManager::new(
                http_client.clone(),
                &vendor.base_url,
                vendor.default_session_ttl_secs,
            ),
            poller: TelemetryPoller::new(
                http_client,
                &vendor.base_url,
                vendor.api_version,
                &vendor.language,
            ),
            host,
            options: DeviceOptions {
                dhw: config.plugin.dhw_device,
                pump: config.plugin.pump_device,
                persist_pump_variable: config.plugin.persist_pump_variable,
            },
            devices: DeviceIndex::default(),
            last_sample: None,
            state: HeartbeatState::Idle,
            failure_threshold: config.plugin.failure_threshold.max(1),
            consecutive_failures: 0,
            degraded: false,
        })
    }

    #[cfg(test)]
    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    /// Last sample pushed to the host
    #[cfg(test)]
    pub fn last_sample(&self) -> Option<TelemetrySample> {
        self.last_sample
    }

    /// Set after `failure_threshold` consecutive failed heartbeats
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn pump_variable_name(&self) -> String {
        format!("{}- CWUPumpWork", self.name)
    }

    fn degraded_variable_name(&self) -> String {
        format!("{}- Degraded", self.name)
    }

    /// Mirror the degraded flag into a host user variable
    async fn publish_health(&self) {
        let value = if self.is_degraded() { "True" } else { "False" };
        if let Err(e) = self
            .host
            .save_user_variable(&self.degraded_variable_name(), value)
            .await
        {
            tracing::warn!("[Bridge] Saving degraded flag failed: {}", e);
        }
    }

    fn transition(&mut self, next: HeartbeatState) {
        tracing::trace!("[Bridge] {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn register_devices(&mut self) -> Result<()> {
        if self.devices.heater.is_none() {
            let device = self
                .host
                .ensure_device(&DeviceSpec::new(HEATER_DEVICE, DeviceKind::Temperature))
                .await?;
            if device.created {
                self.host
                    .update_device(device.idx, 0, INITIAL_HEATER_TEMP)
                    .await?;
            }
            self.devices.heater = Some(device.idx);
        }

        if self.options.dhw && self.devices.dhw.is_none() {
            let device = self
                .host
                .ensure_device(&DeviceSpec::new(DHW_DEVICE, DeviceKind::Temperature))
                .await?;
            self.devices.dhw = Some(device.idx);
        }

        if self.options.pump && self.devices.pump.is_none() {
            let device = self
                .host
                .ensure_device(&DeviceSpec::new(PUMP_DEVICE, DeviceKind::Switch))
                .await?;
            self.devices.pump = Some(device.idx);
        }

        Ok(())
    }

    async fn publish(&mut self, sample: TelemetrySample) -> Result<()> {
        self.register_devices().await?;

        let heater = self
            .devices
            .heater
            .ok_or_else(|| BridgeError::Host("Heater device not registered".to_string()))?;
        self.host
            .update_device(heater, 0, &format_temperature(sample.heater_temp))
            .await?;
        self.last_sample = Some(sample);

        if let (Some(idx), Some(dhw)) = (self.devices.dhw, sample.dhw_temp) {
            if let Err(e) = self.host.update_device(idx, 0, &format_temperature(dhw)).await {
                tracing::warn!("[Bridge] DHW temperature update failed: {}", e);
            }
        }

        if let Some(pump) = sample.pump_active {
            if let Some(idx) = self.devices.pump {
                let (nvalue, svalue) = switch_value(pump);
                if let Err(e) = self.host.update_device(idx, nvalue, svalue).await {
                    tracing::warn!("[Bridge] Pump state update failed: {}", e);
                }
            }

            if self.options.persist_pump_variable {
                let value = if pump { "True" } else { "False" };
                if let Err(e) = self
                    .host
                    .save_user_variable(&self.pump_variable_name(), value)
                    .await
                {
                    tracing::warn!("[Bridge] Saving pump variable failed: {}", e);
                }
            }
        }

        Ok(())
    }

    /// One pass of the heartbeat state machine
    pub async fn heartbeat(&mut self) -> TickOutcome {
        self.transition(HeartbeatState::Idle);

        if self.sessions.needs_login() {
            self.transition(HeartbeatState::Authenticating);
        }

        let expired = match self.sessions.ensure_session(&self.credentials).await {
            Ok(session) => session.is_expired(),
            Err(e) => {
                tracing::warn!("[Econet] Login failed, retrying next heartbeat: {}", e);
                self.transition(HeartbeatState::Idle);
                return TickOutcome::LoginFailed;
            }
        };
        if expired {
            tracing::warn!("[Econet] Session expired on arrival, skipping poll");
            self.transition(HeartbeatState::Idle);
            return TickOutcome::LoginFailed;
        }

        self.transition(HeartbeatState::Polling);

        let result = match self.sessions.current() {
            Some(session) => self.poller.poll(session, &self.credentials.uid).await,
            None => Err(BridgeError::Auth("No session".to_string())),
        };

        let outcome = match result {
            Ok(sample) => {
                tracing::debug!(
                    "[Econet] Heater {:.2}, DHW {:?}, pump {:?}",
                    sample.heater_temp,
                    sample.dhw_temp,
                    sample.pump_active
                );
                match self.publish(sample).await {
                    Ok(()) => TickOutcome::Published(sample),
                    Err(e) => {
                        tracing::error!("[Bridge] Publishing to {} failed: {}", self.host.name(), e);
                        TickOutcome::PublishFailed
                    }
                }
            }
            Err(e) if e.is_auth() => {
                tracing::warn!("[Econet] Session rejected, logging in again: {}", e);
                self.sessions.invalidate();
                if let Err(e) = self.sessions.authenticate(&self.credentials).await {
                    tracing::warn!("[Econet] Re-login failed: {}", e);
                }
                TickOutcome::PollFailed
            }
            Err(e) => {
                tracing::warn!("[Econet] Unable to get telemetry: {}", e);
                TickOutcome::PollFailed
            }
        };

        self.transition(HeartbeatState::Idle);
        outcome
    }

    /// Returns true when the degraded flag flipped
    fn record_outcome(&mut self, outcome: &TickOutcome) -> bool {
        if outcome.is_success() {
            let was_degraded = self.degraded;
            if was_degraded {
                tracing::info!(
                    "[Bridge] Recovered after {} failed heartbeats",
                    self.consecutive_failures
                );
            }
            self.consecutive_failures = 0;
            self.degraded = false;
            return was_degraded;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures == self.failure_threshold {
            self.degraded = true;
            tracing::error!(
                "[Bridge] {} consecutive heartbeats failed, device values are stale",
                self.consecutive_failures
            );
            return true;
        }
        false
    }
}

#[async_trait]
impl Plugin for EconetPlugin {
    async fn on_start(&mut self) {
        tracing::info!(
            "[Bridge] Starting '{}' for device {} ({:?} API)",
            self.name,
            self.credentials.uid,
            self.poller.version()
        );
        // Retried from the first successful poll
        if let Err(e) = self.register_devices().await {
            tracing::error!("[Bridge] Device registration on {} failed: {}", self.host.name(), e);
        }
    }

    async fn on_heartbeat(&mut self) {
        tracing::debug!("[Bridge] Heartbeat");
        let outcome = self.heartbeat().await;
        if self.record_outcome(&outcome) {
            self.publish_health().await;
        }
    }

    async fn on_stop(&mut self) {
        tracing::info!("[Bridge] Stopping '{}'", self.name);
        if let Some(sample) = self.last_sample {
            tracing::debug!("[Bridge] Last published heater temperature {:.2}", sample.heater_temp);
        }
        self.sessions.invalidate();
        self.transition(HeartbeatState::Idle);
    }
}
