//! Configuration management

use genokit_common::{GenokitError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::ReconcileConfig;
use crate::queue::PollConfig;
use crate::storage::StorageConfig;

// ============================================================================
// Health Endpoint Constants
// ============================================================================

/// Default health endpoint host binding.
pub const DEFAULT_HEALTH_HOST: &str = "0.0.0.0";

/// Default health endpoint port.
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Database Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/genokit";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Queue / Pipeline Constants
// ============================================================================

/// Default messages per receive (SQS maximum).
pub const DEFAULT_SQS_MAX_MESSAGES: i32 = 10;

/// Default long-poll wait in seconds (SQS maximum).
pub const DEFAULT_SQS_WAIT_TIME_SECS: i32 = 20;

/// Default delay between polls while messages keep arriving.
pub const DEFAULT_SQS_POLL_BASE_INTERVAL_MS: u64 = 1000;

/// Default ceiling for the empty-receive backoff (5 minutes).
pub const DEFAULT_SQS_POLL_MAX_BACKOFF_MS: u64 = 300_000;

/// Default breakdown rows per insert round-trip.
pub const DEFAULT_INGEST_BREAKDOWN_BATCH_SIZE: usize = 1000;

/// Default kits reconciled concurrently.
pub const DEFAULT_RECONCILE_BATCH_SIZE: usize = 10;

/// Default pause between reconciliation batches.
pub const DEFAULT_RECONCILE_BATCH_PAUSE_MS: u64 = 1000;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub health: HealthConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
    #[serde(skip)]
    pub storage: StorageConfig,
}

/// Health endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// File-ready notifications; listener disabled when unset
    pub processing_queue_url: Option<String>,
    /// Lab-status feed; listener disabled when unset
    pub lab_status_queue_url: Option<String>,
    pub endpoint_url: Option<String>,
    pub max_messages: i32,
    pub wait_time_secs: i32,
    pub poll_base_interval_ms: u64,
    pub poll_max_backoff_ms: u64,
}

/// Ingestion, reconciliation and sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub breakdown_batch_size: usize,
    pub reconcile_batch_size: usize,
    pub reconcile_batch_pause_ms: u64,
    /// Bucket swept for files left under `pending/`
    pub lab_processing_bucket: Option<String>,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl QueueConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            max_messages: self.max_messages,
            wait_time_seconds: self.wait_time_secs,
            base_interval: Duration::from_millis(self.poll_base_interval_ms),
            max_backoff: Duration::from_millis(self.poll_max_backoff_ms),
            ..PollConfig::default()
        }
    }
}

impl PipelineConfig {
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            batch_size: self.reconcile_batch_size,
            batch_pause: Duration::from_millis(self.reconcile_batch_pause_ms),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            health: HealthConfig {
                host: std::env::var("HEALTH_HOST").unwrap_or_else(|_| DEFAULT_HEALTH_HOST.to_string()),
                port: env_or("HEALTH_PORT", DEFAULT_HEALTH_PORT),
                shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            queue: QueueConfig {
                processing_queue_url: env_opt("SQS_PROCESSING_QUEUE_URL"),
                lab_status_queue_url: env_opt("SQS_LAB_STATUS_QUEUE_URL"),
                endpoint_url: env_opt("SQS_ENDPOINT_URL"),
                max_messages: env_or("SQS_MAX_MESSAGES", DEFAULT_SQS_MAX_MESSAGES),
                wait_time_secs: env_or("SQS_WAIT_TIME_SECONDS", DEFAULT_SQS_WAIT_TIME_SECS),
                poll_base_interval_ms: env_or(
                    "SQS_POLL_BASE_INTERVAL_MS",
                    DEFAULT_SQS_POLL_BASE_INTERVAL_MS,
                ),
                poll_max_backoff_ms: env_or("SQS_POLL_MAX_BACKOFF_MS", DEFAULT_SQS_POLL_MAX_BACKOFF_MS),
            },
            pipeline: PipelineConfig {
                breakdown_batch_size: env_or(
                    "INGEST_BREAKDOWN_BATCH_SIZE",
                    DEFAULT_INGEST_BREAKDOWN_BATCH_SIZE,
                ),
                reconcile_batch_size: env_or("RECONCILE_BATCH_SIZE", DEFAULT_RECONCILE_BATCH_SIZE),
                reconcile_batch_pause_ms: env_or(
                    "RECONCILE_BATCH_PAUSE_MS",
                    DEFAULT_RECONCILE_BATCH_PAUSE_MS,
                ),
                lab_processing_bucket: env_opt("S3_LAB_PROCESSING_BUCKET"),
            },
            storage: StorageConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.health.port == 0 {
            return Err(GenokitError::Config("Health port must be greater than 0".into()));
        }

        if self.database.url.is_empty() {
            return Err(GenokitError::Config("Database URL cannot be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(GenokitError::Config(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(GenokitError::Config(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if !(1..=10).contains(&self.queue.max_messages) {
            return Err(GenokitError::invalid(
                "SQS_MAX_MESSAGES",
                self.queue.max_messages.to_string(),
            ));
        }

        if !(0..=20).contains(&self.queue.wait_time_secs) {
            return Err(GenokitError::invalid(
                "SQS_WAIT_TIME_SECONDS",
                self.queue.wait_time_secs.to_string(),
            ));
        }

        if self.queue.poll_max_backoff_ms < self.queue.poll_base_interval_ms {
            return Err(GenokitError::Config(format!(
                "SQS poll max backoff ({} ms) cannot be below the base interval ({} ms)",
                self.queue.poll_max_backoff_ms, self.queue.poll_base_interval_ms
            )));
        }

        if self.pipeline.breakdown_batch_size == 0 {
            return Err(GenokitError::invalid("INGEST_BREAKDOWN_BATCH_SIZE", "0"));
        }

        if self.pipeline.reconcile_batch_size == 0 {
            return Err(GenokitError::invalid("RECONCILE_BATCH_SIZE", "0"));
        }

        if self.queue.processing_queue_url.is_none() {
            tracing::warn!("SQS_PROCESSING_QUEUE_URL not configured - file processing listener disabled");
        }

        if self.queue.lab_status_queue_url.is_none() {
            tracing::warn!("SQS_LAB_STATUS_QUEUE_URL not configured - lab status listener disabled");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            health: HealthConfig {
                host: DEFAULT_HEALTH_HOST.to_string(),
                port: DEFAULT_HEALTH_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            queue: QueueConfig {
                processing_queue_url: None,
                lab_status_queue_url: None,
                endpoint_url: None,
                max_messages: DEFAULT_SQS_MAX_MESSAGES,
                wait_time_secs: DEFAULT_SQS_WAIT_TIME_SECS,
                poll_base_interval_ms: DEFAULT_SQS_POLL_BASE_INTERVAL_MS,
                poll_max_backoff_ms: DEFAULT_SQS_POLL_MAX_BACKOFF_MS,
            },
            pipeline: PipelineConfig {
                breakdown_batch_size: DEFAULT_INGEST_BREAKDOWN_BATCH_SIZE,
                reconcile_batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
                reconcile_batch_pause_ms: DEFAULT_RECONCILE_BATCH_PAUSE_MS,
                lab_processing_bucket: None,
            },
            storage: StorageConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.poll_config(), PollConfig::default());
        assert_eq!(config.pipeline.reconcile_config(), ReconcileConfig::default());
    }

    #[test]
    fn test_validate_queue_limits() {
        let mut config = Config::default();
        config.queue.max_messages = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.queue.wait_time_secs = 21;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.queue.poll_max_backoff_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_pool_sizes() {
        let mut config = Config::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::set_var("SQS_PROCESSING_QUEUE_URL", "https://sqs.us-east-1.amazonaws.com/1/files");
        std::env::set_var("SQS_LAB_STATUS_QUEUE_URL", "  ");
        std::env::set_var("SQS_MAX_MESSAGES", "5");
        std::env::set_var("RECONCILE_BATCH_PAUSE_MS", "250");

        let config = Config::load().unwrap();

        assert_eq!(
            config.queue.processing_queue_url.as_deref(),
            Some("https://sqs.us-east-1.amazonaws.com/1/files")
        );
        assert_eq!(config.queue.lab_status_queue_url, None);
        assert_eq!(config.queue.max_messages, 5);
        assert_eq!(
            config.pipeline.reconcile_config().batch_pause,
            Duration::from_millis(250)
        );

        for var in [
            "SQS_PROCESSING_QUEUE_URL",
            "SQS_LAB_STATUS_QUEUE_URL",
            "SQS_MAX_MESSAGES",
            "RECONCILE_BATCH_PAUSE_MS",
        ] {
            std::env::remove_var(var);
        }
    }
}
