use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the stream publisher.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Stream intake configuration
    pub stream: StreamConfig,
    /// Kafka configuration
    pub kafka: KafkaConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Filtered stream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Streaming endpoint URL
    pub endpoint: String,
    /// Path to the stream credentials JSON file
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
    /// Filter keywords
    #[serde(default = "default_track")]
    pub track: Vec<String>,
    /// Language constraint
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Connect timeout in seconds (the read side stays open indefinitely)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Kafka producer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    pub bootstrap_servers: String,
    /// Topic receiving raw stream messages
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Client ID
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Path to the queue credentials JSON key file (SASL)
    pub key_file: Option<String>,
    /// Enable SSL
    #[serde(default)]
    pub ssl_enabled: bool,
    /// SSL CA certificate path
    pub ssl_ca_location: Option<String>,
    /// Delivery acknowledgment timeout in seconds
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
}

fn default_service_name() -> String {
    "firehose-publisher".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_credentials_file() -> String {
    "stream_credentials.json".to_string()
}

fn default_track() -> Vec<String> {
    vec![
        "covid-19 india".to_string(),
        "covid 19 india".to_string(),
        "covid india".to_string(),
    ]
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_topic() -> String {
    "firehose.statuses".to_string()
}

fn default_client_id() -> String {
    "firehose-publisher".to_string()
}

fn default_ack_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/publisher").required(false))
            .add_source(config::File::with_name("/etc/firehose/publisher").required(false))
            // PUBLISHER__KAFKA__BOOTSTRAP_SERVERS -> kafka.bootstrap_servers
            .add_source(
                config::Environment::with_prefix("PUBLISHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl KafkaConfig {
    /// Delivery acknowledgment timeout as a Duration
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_ack_timeout_secs(), 60);
        assert_eq!(default_languages(), vec!["en"]);
        assert_eq!(default_track().len(), 3);
    }
}
