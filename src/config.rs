//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::domain::Money;
use crate::workflow::BatchConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Daily interest in basis points applied to positive balances
    pub interest_rate_bps: i64,

    /// Movements at or above this amount are flagged for compliance
    pub compliance_threshold: i64,

    /// Events older than this many days get archived
    pub archive_after_days: i64,

    /// Seconds between scheduled end-of-day batch runs
    pub batch_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let interest_rate_bps = env::var("INTEREST_RATE_BPS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("INTEREST_RATE_BPS"))?;

        let compliance_threshold = env::var("COMPLIANCE_THRESHOLD")
            .unwrap_or_else(|_| "1000000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("COMPLIANCE_THRESHOLD"))?;

        let archive_after_days = env::var("ARCHIVE_AFTER_DAYS")
            .unwrap_or_else(|_| "90".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("ARCHIVE_AFTER_DAYS"))?;

        let batch_interval_secs = env::var("BATCH_INTERVAL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("BATCH_INTERVAL_SECS"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            interest_rate_bps,
            compliance_threshold,
            archive_after_days,
            batch_interval_secs,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Batch tuning parameters derived from configuration
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            interest_rate_bps: self.interest_rate_bps,
            compliance_threshold: Money::new(self.compliance_threshold),
            archive_after_days: self.archive_after_days,
        }
    }

    /// Interval between scheduled batch runs
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs)
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
