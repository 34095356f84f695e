//! econet24 cloud integration module
//!
//! - `session`: Login handshake and session-cookie lifecycle
//! - `telemetry`: Device parameter polling and response parsing

pub mod session;
pub mod telemetry;

pub use session::{Credentials, SessionManager};
pub use telemetry::{ApiVersion, TelemetryPoller, TelemetrySample};

use std::time::Duration;

use reqwest::{redirect, Client};

use crate::error::{BridgeError, Result};

const USER_AGENT: &str = concat!("econet-bridge/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by the session manager and the poller.
///
/// Redirects are not followed: the login endpoint answers with a redirect
/// that carries the session cookies, and a redirect on a telemetry request
/// means the session was rejected.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .redirect(redirect::Policy::none())
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Accepts connections and never answers
#[cfg(test)]
pub(crate) async fn stalled_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}
