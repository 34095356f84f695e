//! Error handling module

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Host API error: {0}")]
    Host(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// True when the vendor rejected the session and a fresh login is needed
    pub fn is_auth(&self) -> bool {
        matches!(self, BridgeError::Auth(_))
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BridgeError::Parse(e.to_string())
        } else {
            BridgeError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_auth() {
        assert!(BridgeError::Auth("no sessionid".into()).is_auth());
        assert!(!BridgeError::Network("refused".into()).is_auth());
        assert!(!BridgeError::Parse("bad json".into()).is_auth());
    }

    #[test]
    fn test_json_error_maps_to_parse() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(BridgeError::from(err), BridgeError::Parse(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BridgeError::Host("status = ERR".into()).to_string(),
            "Host API error: status = ERR"
        );
    }
}
