//! Device parameter polling

use std::collections::HashMap;

use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::session::Session;
use crate::error::{BridgeError, Result};

/// Register holding the boiler temperature in the v2 register map
const V2_HEATER_TEMP_KEY: &str = "1024";

/// Vendor API generation; the two response shapes are incompatible
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
}

impl ApiVersion {
    pub fn endpoint(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "/service/getDeviceParams",
            ApiVersion::V2 => "/service/getDeviceRegParams",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub heater_temp: f64,
    pub dhw_temp: Option<f64>,
    pub pump_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CurrentParams {
    #[serde(rename = "tempCO")]
    temp_co: f64,
    #[serde(rename = "tempCWU")]
    temp_cwu: Option<f64>,
    #[serde(rename = "pumpCWUWorks")]
    pump_cwu_works: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct DeviceParamsV1 {
    curr: CurrentParams,
}

#[derive(Debug, Deserialize)]
struct DeviceParamsV2 {
    data: HashMap<String, serde_json::Value>,
}

fn register_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Map a telemetry body onto a sample.
///
/// A body carrying an `error` key means the vendor rejected the session.
pub fn parse_telemetry(version: ApiVersion, body: &str) -> Result<TelemetrySample> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    if let Some(error) = value.get("error") {
        return Err(BridgeError::Auth(format!("Vendor returned error: {}", error)));
    }

    match version {
        ApiVersion::V1 => {
            let params: DeviceParamsV1 = serde_json::from_value(value)?;
            Ok(TelemetrySample {
                heater_temp: params.curr.temp_co,
                dhw_temp: params.curr.temp_cwu,
                pump_active: params.curr.pump_cwu_works,
            })
        }
        ApiVersion::V2 => {
            let params: DeviceParamsV2 = serde_json::from_value(value)?;
            let heater_temp = params
                .data
                .get(V2_HEATER_TEMP_KEY)
                .and_then(register_as_f64)
                .ok_or_else(|| {
                    BridgeError::Parse(format!("Register {} missing or not numeric", V2_HEATER_TEMP_KEY))
                })?;
            Ok(TelemetrySample {
                heater_temp,
                dhw_temp: None,
                pump_active: None,
            })
        }
    }
}

pub struct TelemetryPoller {
    http_client: Client,
    base_url: String,
    version: ApiVersion,
    language: String,
}

impl TelemetryPoller {
    pub fn new(http_client: Client, base_url: &str, version: ApiVersion, language: &str) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            version,
            language: language.to_string(),
        }
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub async fn poll(&self, session: &Session, uid: &str) -> Result<TelemetrySample> {
        if session.is_expired() {
            return Err(BridgeError::Auth("Session expired before poll".to_string()));
        }

        let url = format!("{}{}", self.base_url, self.version.endpoint());

        let resp = self
            .http_client
            .get(&url)
            .query(&[("uid", uid)])
            .header(COOKIE, session.cookie_header(&self.language))
            .send()
            .await
            .map_err(|e| BridgeError::Network(format!("Telemetry request failed: {}", e)))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status.is_redirection()
        {
            return Err(BridgeError::Auth(format!("Telemetry rejected: {}", status)));
        }
        if !status.is_success() {
            return Err(BridgeError::Network(format!("Telemetry HTTP error: {}", status)));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| BridgeError::Network(format!("Failed to read telemetry: {}", e)))?;

        tracing::trace!("[Econet] Telemetry body: {}", body);

        parse_telemetry(self.version, &body)
    }
}
