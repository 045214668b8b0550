//! Credential files, loaded once at process start.
//!
//! Both files are plain local JSON. They are read in `main` and handed to
//! the component constructors by reference; nothing reads them lazily from
//! ambient state afterwards.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// Stream API credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StreamCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

/// Queue service-account key, mapped onto SASL settings for the producer.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueCredentials {
    pub username: String,
    pub password: String,
}

impl StreamCredentials {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stream credentials file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse stream credentials file {}", path.display()))
    }
}

impl QueueCredentials {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read queue key file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse queue key file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_credentials_use_upper_case_keys() {
        let json = r#"{
            "API_KEY": "k",
            "API_SECRET": "s",
            "ACCESS_TOKEN": "t",
            "ACCESS_TOKEN_SECRET": "ts"
        }"#;
        let creds: StreamCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.api_key, "k");
        assert_eq!(creds.access_token_secret, "ts");
    }

    #[test]
    fn test_queue_credentials() {
        let json = r#"{"username": "svc", "password": "pw"}"#;
        let creds: QueueCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.username, "svc");
    }
}
