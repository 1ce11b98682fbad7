//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::outbox::{ClaimMode, PartitionKey, RelayConfig};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Connections kept warm in the pool
    pub database_min_connections: u32,

    /// Hard cap on pool size
    pub database_max_connections: u32,

    /// How long acquisition may block when the pool is saturated
    pub database_acquire_timeout: Duration,

    /// Deadline for a single statement in the event store
    pub database_statement_timeout: Duration,

    /// Kafka bootstrap endpoints
    pub kafka_bootstrap_servers: String,

    /// Producer acks level ("all" recommended)
    pub kafka_acks: String,

    /// Deadline for a single publish to be acknowledged
    pub kafka_publish_timeout: Duration,

    /// Relay poll interval
    pub outbox_poll_interval: Duration,

    /// Maximum outbox rows per relay invocation
    pub outbox_batch_size: i64,

    /// Delivery attempts before a row is dead-lettered
    pub outbox_max_attempts: i32,

    /// Which id keys published messages
    pub outbox_partition_key: PartitionKey,

    /// How the relay claims rows
    pub outbox_claim_mode: ClaimMode,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_min_connections = env::var("DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MIN_CONNECTIONS"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let database_acquire_timeout = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue("DATABASE_ACQUIRE_TIMEOUT_SECS"))?;

        let database_statement_timeout = env::var("DATABASE_STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue("DATABASE_STATEMENT_TIMEOUT_SECS"))?;

        let kafka_bootstrap_servers = env::var("KAFKA_BOOTSTRAP_SERVERS")
            .map_err(|_| ConfigError::MissingEnv("KAFKA_BOOTSTRAP_SERVERS"))?;

        let kafka_acks = env::var("KAFKA_ACKS").unwrap_or_else(|_| "all".to_string());

        let kafka_publish_timeout = env::var("KAFKA_PUBLISH_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue("KAFKA_PUBLISH_TIMEOUT_SECS"))?;

        let outbox_poll_interval = env::var("OUTBOX_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue("OUTBOX_POLL_INTERVAL_MS"))?;

        let outbox_batch_size = env::var("OUTBOX_BATCH_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("OUTBOX_BATCH_SIZE"))?;

        let outbox_max_attempts = env::var("OUTBOX_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("OUTBOX_MAX_ATTEMPTS"))?;

        let outbox_partition_key = env::var("OUTBOX_PARTITION_KEY")
            .unwrap_or_else(|_| "aggregate_id".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("OUTBOX_PARTITION_KEY"))?;

        let outbox_claim_mode = env::var("OUTBOX_CLAIM_MODE")
            .unwrap_or_else(|_| "single".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("OUTBOX_CLAIM_MODE"))?;

        Ok(Self {
            database_url,
            database_min_connections,
            database_max_connections,
            database_acquire_timeout,
            database_statement_timeout,
            kafka_bootstrap_servers,
            kafka_acks,
            kafka_publish_timeout,
            outbox_poll_interval,
            outbox_batch_size,
            outbox_max_attempts,
            outbox_partition_key,
            outbox_claim_mode,
        })
    }

    /// Relay tuning derived from this configuration
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            batch_size: self.outbox_batch_size,
            max_attempts: self.outbox_max_attempts,
            partition_key: self.outbox_partition_key,
            claim_mode: self.outbox_claim_mode,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
