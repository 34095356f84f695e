//! Configuration module

use std::time::Duration;

use serde::Deserialize;

use crate::econet::session::MAX_SESSION_TTL_SECS;
use crate::econet::{ApiVersion, Credentials};

const MIN_HEARTBEAT_SECS: u64 = 10;
const MAX_HEARTBEAT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub vendor: VendorConfig,
    pub host: HostConfig,
    #[serde(default)]
    pub plugin: PluginConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    #[serde(default = "default_vendor_url")]
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub uid: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_session_ttl")]
    pub default_session_ttl_secs: u64,
}

/// Local Domoticz JSON API
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_host_address")]
    pub address: String,
    #[serde(default = "default_host_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub hardware_idx: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_plugin_name")]
    pub name: String,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default)]
    pub dhw_device: bool,
    #[serde(default)]
    pub pump_device: bool,
    #[serde(default = "default_true")]
    pub persist_pump_variable: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: default_plugin_name(),
            heartbeat_secs: default_heartbeat(),
            log_level: LogLevel::default(),
            request_timeout_secs: default_timeout(),
            failure_threshold: default_failure_threshold(),
            dhw_device: false,
            pump_device: false,
            persist_pump_variable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum LogLevel {
    #[default]
    #[serde(alias = "normal")]
    Normal,
    #[serde(alias = "verbose")]
    Verbose,
    #[serde(alias = "debug")]
    Debug,
}

impl LogLevel {
    /// Default `EnvFilter` directive when RUST_LOG is unset
    pub fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Normal => "econet_bridge=info",
            LogLevel::Verbose => "econet_bridge=debug",
            LogLevel::Debug => "econet_bridge=trace,reqwest=debug",
        }
    }
}

fn default_vendor_url() -> String {
    "https://www.econet24.com".to_string()
}

fn default_language() -> String {
    "pl".to_string()
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_host_address() -> String {
    "localhost".to_string()
}

fn default_host_port() -> u16 {
    8080
}

fn default_plugin_name() -> String {
    "Econet".to_string()
}

fn default_heartbeat() -> u64 {
    30
}

fn default_timeout() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl PluginConfig {
    /// Heartbeat period; out-of-range values fall back to the default
    pub fn heartbeat_interval(&self) -> Duration {
        let secs = if (MIN_HEARTBEAT_SECS..=MAX_HEARTBEAT_SECS).contains(&self.heartbeat_secs) {
            self.heartbeat_secs
        } else {
            default_heartbeat()
        };
        Duration::from_secs(secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl HostConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

impl VendorConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            uid: self.uid.clone(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                // Values stay strings so zero-padded passwords and UIDs survive
                config::Environment::with_prefix("ECONET").separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.vendor.username.is_empty() || self.vendor.password.is_empty() {
            anyhow::bail!("vendor username and password are required");
        }
        if self.vendor.uid.is_empty() {
            anyhow::bail!("vendor device uid is required");
        }
        if !(1..=MAX_SESSION_TTL_SECS).contains(&self.vendor.default_session_ttl_secs) {
            anyhow::bail!(
                "vendor default_session_ttl_secs must be between 1 and {}",
                MAX_SESSION_TTL_SECS
            );
        }
        url::Url::parse(&self.vendor.base_url)
            .map_err(|e| anyhow::anyhow!("invalid vendor base_url {}: {}", self.vendor.base_url, e))?;
        url::Url::parse(&self.host.base_url())
            .map_err(|e| anyhow::anyhow!("invalid host address {}: {}", self.host.address, e))?;
        Ok(())
    }

    /// Dump the effective configuration at debug level, secrets redacted
    pub fn log_summary(&self) {
        tracing::debug!(
            "[Config] vendor: base_url={} username={} uid={} api={:?} language={}",
            self.vendor.base_url,
            self.vendor.username,
            self.vendor.uid,
            self.vendor.api_version,
            self.vendor.language
        );
        tracing::debug!(
            "[Config] host: {} user={} password={} hardware_idx={}",
            self.host.base_url(),
            self.host.username,
            if self.host.password.is_empty() { "<none>" } else { "<redacted>" },
            self.host.hardware_idx
        );
        tracing::debug!("[Config] plugin: {:?}", self.plugin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn from_json(value: serde_json::Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    fn minimal() -> serde_json::Value {
        serde_json::json!({
            "vendor": { "username": "jan", "password": "secret", "uid": "ABC123" },
            "host": { "hardware_idx": 4 }
        })
    }

    #[test]
    fn test_defaults() {
        let config = from_json(minimal());
        assert_eq!(config.vendor.base_url, "https://www.econet24.com");
        assert_eq!(config.vendor.api_version, ApiVersion::V1);
        assert_eq!(config.vendor.language, "pl");
        assert_eq!(config.host.base_url(), "http://localhost:8080");
        assert_eq!(config.plugin.name, "Econet");
        assert_eq!(config.plugin.log_level, LogLevel::Normal);
        assert!(config.plugin.persist_pump_variable);
        assert!(!config.plugin.pump_device);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_heartbeat_guard() {
        let mut plugin = PluginConfig::default();
        plugin.heartbeat_secs = 15;
        assert_eq!(plugin.heartbeat_interval(), Duration::from_secs(15));
        plugin.heartbeat_secs = 60;
        assert_eq!(plugin.heartbeat_interval(), Duration::from_secs(60));
        plugin.heartbeat_secs = 5;
        assert_eq!(plugin.heartbeat_interval(), Duration::from_secs(30));
        plugin.heartbeat_secs = 120;
        assert_eq!(plugin.heartbeat_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_missing_uid() {
        let mut value = minimal();
        value["vendor"]["uid"] = serde_json::json!("");
        assert_err!(from_json(value).validate());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut value = minimal();
        value["vendor"]["base_url"] = serde_json::json!("not a url");
        assert_err!(from_json(value).validate());
    }

    #[test]
    fn test_validate_bounds_session_ttl() {
        let mut value = minimal();
        value["vendor"]["default_session_ttl_secs"] = serde_json::json!(0);
        assert_err!(from_json(value.clone()).validate());

        value["vendor"]["default_session_ttl_secs"] = serde_json::json!(u64::MAX);
        assert_err!(from_json(value.clone()).validate());

        value["vendor"]["default_session_ttl_secs"] = serde_json::json!(MAX_SESSION_TTL_SECS);
        assert_ok!(from_json(value).validate());
    }

    #[test]
    fn test_load_keeps_zero_padded_env_values() {
        std::env::set_var("ECONET__VENDOR__USERNAME", "jan");
        std::env::set_var("ECONET__VENDOR__PASSWORD", "007123");
        std::env::set_var("ECONET__VENDOR__UID", "0042");
        std::env::set_var("ECONET__HOST__HARDWARE_IDX", "3");

        let loaded = Config::load();

        for key in [
            "ECONET__VENDOR__USERNAME",
            "ECONET__VENDOR__PASSWORD",
            "ECONET__VENDOR__UID",
            "ECONET__HOST__HARDWARE_IDX",
        ] {
            std::env::remove_var(key);
        }

        let config = loaded.unwrap();
        assert_eq!(config.vendor.password, "007123");
        assert_eq!(config.vendor.uid, "0042");
        assert_eq!(config.host.hardware_idx, 3);
    }

    #[test]
    fn test_log_level_and_version_parsing() {
        let mut value = minimal();
        value["vendor"]["api_version"] = serde_json::json!("v2");
        value["plugin"] = serde_json::json!({ "log_level": "Verbose" });
        let config = from_json(value);
        assert_eq!(config.vendor.api_version, ApiVersion::V2);
        assert_eq!(config.plugin.log_level.filter_directive(), "econet_bridge=debug");
    }
}
