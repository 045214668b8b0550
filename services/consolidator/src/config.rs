use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the consolidator service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Warehouse database configuration
    pub database: DatabaseConfig,
    /// Workflow configuration
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Bucket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Landing bucket drained on every run
    #[serde(default = "default_landing_bucket")]
    pub landing_bucket: String,
    /// Archive bucket receiving copy-before-delete of landing objects
    #[serde(default = "default_archive_bucket")]
    pub archive_bucket: String,
    /// Bucket receiving the consolidated file
    #[serde(default = "default_consolidated_bucket")]
    pub consolidated_bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Warehouse database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Consolidation workflow configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Seconds between runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Local path of the consolidated file, transient per run
    #[serde(default = "default_local_path")]
    pub local_path: String,
    /// Object key of the consolidated file
    #[serde(default = "default_consolidated_object")]
    pub consolidated_object: String,
    /// Advisory lock key guarding against overlapping runs
    #[serde(default = "default_lock_key")]
    pub lock_key: i64,
}

fn default_service_name() -> String {
    "firehose-consolidator".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

fn default_landing_bucket() -> String {
    "firehose-landing".to_string()
}

fn default_archive_bucket() -> String {
    "firehose-archive".to_string()
}

fn default_consolidated_bucket() -> String {
    "firehose-consolidated".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    60
}

fn default_local_path() -> String {
    "combined.csv".to_string()
}

fn default_consolidated_object() -> String {
    "combined.csv".to_string()
}

fn default_lock_key() -> i64 {
    815_001
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/consolidator").required(false))
            .add_source(config::File::with_name("/etc/firehose/consolidator").required(false))
            // CONSOLIDATOR__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("CONSOLIDATOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get database connection timeout as Duration
    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_secs)
    }

    /// Get run interval as Duration
    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.workflow.interval_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            landing_bucket: default_landing_bucket(),
            archive_bucket: default_archive_bucket(),
            consolidated_bucket: default_consolidated_bucket(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            local_path: default_local_path(),
            consolidated_object: default_consolidated_object(),
            lock_key: default_lock_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_interval_secs(), 60);
        assert_eq!(default_consolidated_object(), "combined.csv");
        assert_eq!(default_run_migrations(), true);
    }
}
