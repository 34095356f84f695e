//! Plugin lifecycle
//!
//! The runner owns exactly one plugin and drives it: `on_start` once,
//! `on_heartbeat` per timer tick (never overlapping), `on_stop` on shutdown.

mod bridge;

pub use self::bridge::EconetPlugin;

use async_trait::async_trait;

use crate::econet::TelemetrySample;

#[async_trait]
pub trait Plugin: Send {
    async fn on_start(&mut self);

    /// Errors are handled inside; a failed tick only means no update
    async fn on_heartbeat(&mut self);

    async fn on_stop(&mut self);
}

/// Heartbeat state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Idle,
    Authenticating,
    Polling,
}

/// What a single heartbeat achieved
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Published(TelemetrySample),
    LoginFailed,
    PollFailed,
    PublishFailed,
}

impl TickOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TickOutcome::Published(_))
    }
}
