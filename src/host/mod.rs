//! Home-automation host integration
//!
//! The bridge only needs to create a handful of devices once and push
//! values into them; everything else about the host stays behind
//! [`DeviceHost`].

mod domoticz;

pub use self::domoticz::DomoticzClient;

use async_trait::async_trait;

use crate::error::Result;

/// Kind of host device backing a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Temperature,
    Switch,
}

impl DeviceKind {
    /// Domoticz device type / subtype pair
    pub fn type_codes(&self) -> (u32, u32) {
        match self {
            DeviceKind::Temperature => (80, 5),
            DeviceKind::Switch => (244, 73),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub name: String,
    pub kind: DeviceKind,
}

impl DeviceSpec {
    pub fn new(name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Device known to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredDevice {
    pub idx: u64,
    /// Created by this call rather than found
    pub created: bool,
}

/// Host device layer
#[async_trait]
pub trait DeviceHost: Send + Sync {
    /// Look the device up by name, creating it when absent
    async fn ensure_device(&self, spec: &DeviceSpec) -> Result<RegisteredDevice>;

    async fn update_device(&self, idx: u64, nvalue: i32, svalue: &str) -> Result<()>;

    /// Create or overwrite a string user variable
    async fn save_user_variable(&self, name: &str, value: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Host string encoding of a temperature: rounded to 2 decimals, shortest form
pub fn format_temperature(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    rounded.to_string()
}

#[cfg(test)]
pub fn parse_temperature(svalue: &str) -> Option<f64> {
    svalue.split(';').next()?.trim().parse().ok()
}

/// `(nvalue, svalue)` for a switch device
pub fn switch_value(on: bool) -> (i32, &'static str) {
    if on {
        (1, "On")
    } else {
        (0, "Off")
    }
}
