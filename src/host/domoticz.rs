//! Domoticz JSON API client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{DeviceHost, DeviceSpec, RegisteredDevice};
use crate::config::HostConfig;
use crate::error::{BridgeError, Result};

/// Variable type "string" in the user variable API
const STRING_VARIABLE: &str = "2";

pub struct DomoticzClient {
    http_client: Client,
    base_url: String,
    username: String,
    password: String,
    hardware_idx: u64,
}

#[derive(Debug, Deserialize)]
struct DomoticzResponse<T> {
    status: String,
    result: Option<T>,
    #[serde(default)]
    idx: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DeviceInfo {
    idx: serde_json::Value,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "HardwareID", default)]
    hardware_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UserVariable {
    #[serde(rename = "Name")]
    name: String,
}

/// Domoticz sends idx values as strings in most places
fn parse_idx(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl DomoticzClient {
    pub fn new(http_client: Client, config: &HostConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            hardware_idx: config.hardware_idx,
        }
    }

    async fn command<T>(&self, param: &str, args: &[(&str, String)]) -> Result<DomoticzResponse<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/json.htm", self.base_url);

        let mut request = self
            .http_client
            .get(&url)
            .query(&[("type", "command"), ("param", param)])
            .query(args);

        if !self.username.is_empty() {
            tracing::trace!("[Domoticz] Using basic auth for {}", self.username);
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| BridgeError::Host(format!("{} request failed: {}", param, e)))?;

        if !resp.status().is_success() {
            return Err(BridgeError::Host(format!("{}: HTTP error {}", param, resp.status())));
        }

        let body: DomoticzResponse<T> = resp
            .json()
            .await
            .map_err(|e| BridgeError::Host(format!("{} parse failed: {}", param, e)))?;

        if body.status != "OK" {
            return Err(BridgeError::Host(format!("{} returned status = {}", param, body.status)));
        }

        Ok(body)
    }

    async fn find_device(&self, name: &str) -> Result<Option<u64>> {
        let resp: DomoticzResponse<Vec<DeviceInfo>> = self
            .command(
                "getdevices",
                &[("filter", "all".to_string()), ("used", "all".to_string())],
            )
            .await?;

        Ok(resp
            .result
            .unwrap_or_default()
            .iter()
            .filter(|d| d.hardware_id.map_or(true, |hw| hw == self.hardware_idx))
            .find(|d| d.name == name)
            .and_then(|d| parse_idx(&d.idx)))
    }

    async fn variable_exists(&self, name: &str) -> Result<bool> {
        let resp: DomoticzResponse<Vec<UserVariable>> =
            self.command("getuservariables", &[]).await?;
        Ok(resp
            .result
            .unwrap_or_default()
            .iter()
            .any(|v| v.name == name))
    }
}

#[async_trait]
impl DeviceHost for DomoticzClient {
    async fn ensure_device(&self, spec: &DeviceSpec) -> Result<RegisteredDevice> {
        if let Some(idx) = self.find_device(&spec.name).await? {
            tracing::debug!("[Domoticz] Device '{}' exists (idx {})", spec.name, idx);
            return Ok(RegisteredDevice { idx, created: false });
        }

        let (device_type, device_subtype) = spec.kind.type_codes();
        let resp: DomoticzResponse<serde_json::Value> = self
            .command(
                "createdevice",
                &[
                    ("idx", self.hardware_idx.to_string()),
                    ("sensorname", spec.name.clone()),
                    ("devicetype", device_type.to_string()),
                    ("devicesubtype", device_subtype.to_string()),
                ],
            )
            .await?;

        let idx = resp
            .idx
            .as_ref()
            .and_then(parse_idx)
            .ok_or_else(|| BridgeError::Host(format!("createdevice returned no idx for '{}'", spec.name)))?;

        tracing::info!("[Domoticz] Created device '{}' (idx {})", spec.name, idx);
        Ok(RegisteredDevice { idx, created: true })
    }

    async fn update_device(&self, idx: u64, nvalue: i32, svalue: &str) -> Result<()> {
        self.command::<serde_json::Value>(
            "udevice",
            &[
                ("idx", idx.to_string()),
                ("nvalue", nvalue.to_string()),
                ("svalue", svalue.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn save_user_variable(&self, name: &str, value: &str) -> Result<()> {
        let param = if self.variable_exists(name).await? {
            "updateuservariable"
        } else {
            tracing::debug!("[Domoticz] User variable {} does not exist, creating", name);
            "saveuservariable"
        };

        self.command::<serde_json::Value>(
            param,
            &[
                ("vname", name.to_string()),
                ("vtype", STRING_VARIABLE.to_string()),
                ("vvalue", value.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Domoticz"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DeviceKind;
    use mockito::{Matcher, Server};

    fn client(server: &Server, username: &str) -> DomoticzClient {
        let url = url::Url::parse(&server.url()).unwrap();
        let config = HostConfig {
            address: url.host_str().unwrap().to_string(),
            port: url.port().unwrap(),
            username: username.to_string(),
            password: "secret".to_string(),
            hardware_idx: 4,
        };
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap();
        DomoticzClient::new(http_client, &config)
    }

    fn command(param: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("type".into(), "command".into()),
            Matcher::UrlEncoded("param".into(), param.into()),
        ])
    }

    #[test]
    fn test_parse_idx() {
        assert_eq!(parse_idx(&serde_json::json!("12")), Some(12));
        assert_eq!(parse_idx(&serde_json::json!(7)), Some(7));
        assert_eq!(parse_idx(&serde_json::json!(null)), None);
    }

    #[tokio::test]
    async fn test_ensure_device_finds_existing() {
        let mut server = Server::new_async().await;
        let _list = server
            .mock("GET", "/json.htm")
            .match_query(command("getdevices"))
            .with_status(200)
            .with_body(
                r#"{"status":"OK","result":[
                    {"idx":"3","Name":"Heater Temperature","HardwareID":9},
                    {"idx":"12","Name":"Heater Temperature","HardwareID":4}
                ]}"#,
            )
            .create_async()
            .await;
        let create = server
            .mock("GET", "/json.htm")
            .match_query(command("createdevice"))
            .expect(0)
            .create_async()
            .await;

        let device = client(&server, "")
            .ensure_device(&DeviceSpec::new("Heater Temperature", DeviceKind::Temperature))
            .await
            .unwrap();

        assert_eq!(device, RegisteredDevice { idx: 12, created: false });
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_ensure_device_creates_missing() {
        let mut server = Server::new_async().await;
        let _list = server
            .mock("GET", "/json.htm")
            .match_query(command("getdevices"))
            .with_status(200)
            .with_body(r#"{"status":"OK"}"#)
            .create_async()
            .await;
        let create = server
            .mock("GET", "/json.htm")
            .match_query(Matcher::AllOf(vec![
                command("createdevice"),
                Matcher::UrlEncoded("idx".into(), "4".into()),
                Matcher::UrlEncoded("sensorname".into(), "DHW Pump".into()),
                Matcher::UrlEncoded("devicetype".into(), "244".into()),
                Matcher::UrlEncoded("devicesubtype".into(), "73".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"status":"OK","idx":"21","title":"CreateSensor"}"#)
            .create_async()
            .await;

        let device = client(&server, "")
            .ensure_device(&DeviceSpec::new("DHW Pump", DeviceKind::Switch))
            .await
            .unwrap();

        assert_eq!(device, RegisteredDevice { idx: 21, created: true });
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_device_with_basic_auth() {
        let mut server = Server::new_async().await;
        let update = server
            .mock("GET", "/json.htm")
            .match_query(Matcher::AllOf(vec![
                command("udevice"),
                Matcher::UrlEncoded("idx".into(), "12".into()),
                Matcher::UrlEncoded("nvalue".into(), "0".into()),
                Matcher::UrlEncoded("svalue".into(), "45.5".into()),
            ]))
            .match_header("authorization", "Basic amFuOnNlY3JldA==")
            .with_status(200)
            .with_body(r#"{"status":"OK","title":"Update Device"}"#)
            .create_async()
            .await;

        client(&server, "jan")
            .update_device(12, 0, "45.5")
            .await
            .unwrap();

        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_host_error() {
        let mut server = Server::new_async().await;
        let _update = server
            .mock("GET", "/json.htm")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"ERR"}"#)
            .create_async()
            .await;

        let err = client(&server, "")
            .update_device(12, 0, "45.5")
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Host(_)));
    }

    #[tokio::test]
    async fn test_save_user_variable_creates_then_updates() {
        let mut server = Server::new_async().await;
        let _vars = server
            .mock("GET", "/json.htm")
            .match_query(command("getuservariables"))
            .with_status(200)
            .with_body(r#"{"status":"OK","result":[{"idx":"1","Name":"other","Value":"x"}]}"#)
            .create_async()
            .await;
        let save = server
            .mock("GET", "/json.htm")
            .match_query(Matcher::AllOf(vec![
                command("saveuservariable"),
                Matcher::UrlEncoded("vname".into(), "Econet- CWUPumpWork".into()),
                Matcher::UrlEncoded("vtype".into(), "2".into()),
                Matcher::UrlEncoded("vvalue".into(), "True".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"status":"OK"}"#)
            .create_async()
            .await;

        client(&server, "")
            .save_user_variable("Econet- CWUPumpWork", "True")
            .await
            .unwrap();
        save.assert_async().await;

        let mut server = Server::new_async().await;
        let _vars = server
            .mock("GET", "/json.htm")
            .match_query(command("getuservariables"))
            .with_status(200)
            .with_body(
                r#"{"status":"OK","result":[{"idx":"1","Name":"Econet- CWUPumpWork","Value":"True"}]}"#,
            )
            .create_async()
            .await;
        let update = server
            .mock("GET", "/json.htm")
            .match_query(command("updateuservariable"))
            .with_status(200)
            .with_body(r#"{"status":"OK"}"#)
            .create_async()
            .await;

        client(&server, "")
            .save_user_variable("Econet- CWUPumpWork", "False")
            .await
            .unwrap();
        update.assert_async().await;
    }
}
