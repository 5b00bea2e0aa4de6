//! # Configuration
//!
//! YAML-based configuration for the anonymization worker, with per-environment
//! overrides and `EPETS__SECTION__KEY` environment variables layered on top.
//!
//! ## Layering
//!
//! 1. `config/epets.yaml` (required)
//! 2. `config/epets.<environment>.yaml` (optional)
//! 3. `EPETS__*` environment variables, e.g. `EPETS__QUEUE__POLL_INTERVAL_MS=250`
//! 4. `DATABASE_URL`, which replaces `database.url`
//!
//! Every section has defaults, so an override file only needs the keys it
//! changes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use epets_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let database_url = manager.config().database_url();
//! let batch_limit = manager.config().anonymization.batch_limit;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;
use crate::validation::SignatureValidationConfig;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EpetsConfig {
    /// Set by the loader from the detected environment
    pub environment: String,
    pub database: DatabaseConfig,
    pub anonymization: AnonymizationConfig,
    pub queue: QueueConfig,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual components
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database name; derived from the environment when unset
    pub database: Option<String>,
    pub pool: u32,
    /// Seconds to wait for a pooled connection
    pub checkout_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "epets".to_string(),
            password: "epets".to_string(),
            database: None,
            pool: 5,
            checkout_timeout: 10,
        }
    }
}

impl DatabaseConfig {
    /// Database name for the given environment
    pub fn database_name(&self, environment: &str) -> String {
        match &self.database {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("epets_rust_{environment}"),
        }
    }

    /// Connection URL, either the explicit `url` or one built from components
    pub fn database_url(&self, environment: &str) -> String {
        if let Some(url) = self.url.as_deref().filter(|url| !url.is_empty()) {
            return url.to_string();
        }

        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username,
            self.password,
            self.host,
            self.port,
            self.database_name(environment)
        )
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.checkout_timeout)
    }
}

/// Batch sizing, retention and monitoring for the anonymization job
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnonymizationConfig {
    /// Signatures processed per invocation
    pub batch_limit: i64,
    /// Months a petition stays closed before its signatures are anonymized
    pub retention_months: u32,
    /// Consecutive failures of one signature before alerts are raised
    pub failure_alert_threshold: u32,
    pub validation: SignatureValidationConfig,
}

impl Default for AnonymizationConfig {
    fn default() -> Self {
        Self {
            batch_limit: constants::DEFAULT_BATCH_LIMIT,
            retention_months: constants::DEFAULT_RETENTION_MONTHS,
            failure_alert_threshold: constants::DEFAULT_FAILURE_ALERT_THRESHOLD,
            validation: SignatureValidationConfig::default(),
        }
    }
}

/// Job queue polling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub visibility_timeout_seconds: i32,
    pub poll_interval_ms: u64,
    pub read_batch_size: i32,
    /// Deliveries after which a message is archived instead of retried
    pub max_read_count: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: constants::ANONYMIZE_PETITION_QUEUE.to_string(),
            visibility_timeout_seconds: constants::queue::DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
            poll_interval_ms: constants::queue::DEFAULT_POLL_INTERVAL_MS,
            read_batch_size: constants::queue::DEFAULT_READ_BATCH_SIZE,
            max_read_count: constants::queue::DEFAULT_MAX_READ_COUNT,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Periodic sweep that starts anonymization chains
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: constants::sweep::DEFAULT_INTERVAL_SECONDS,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl EpetsConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.database.pool == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.pool",
                "0",
                "pool size must be greater than 0",
            ));
        }

        if self.database.url.is_none() && self.database.host.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.host",
                "database configuration without a url",
            ));
        }

        if self.anonymization.batch_limit <= 0 {
            return Err(ConfigurationError::invalid_value(
                "anonymization.batch_limit",
                self.anonymization.batch_limit.to_string(),
                "batch limit must be greater than 0",
            ));
        }

        let validation = &self.anonymization.validation;
        if validation.max_location_code_length == 0 || validation.max_postcode_length == 0 {
            return Err(ConfigurationError::invalid_value(
                "anonymization.validation",
                format!(
                    "max_location_code_length={}, max_postcode_length={}",
                    validation.max_location_code_length, validation.max_postcode_length
                ),
                "length limits must be greater than 0",
            ));
        }

        if self.queue.name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "queue.name",
                "queue configuration",
            ));
        }

        if self.queue.visibility_timeout_seconds <= 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.visibility_timeout_seconds",
                self.queue.visibility_timeout_seconds.to_string(),
                "visibility timeout must be greater than 0",
            ));
        }

        if self.queue.read_batch_size <= 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.read_batch_size",
                self.queue.read_batch_size.to_string(),
                "read batch size must be greater than 0",
            ));
        }

        if self.queue.max_read_count <= 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.max_read_count",
                self.queue.max_read_count.to_string(),
                "max read count must be greater than 0",
            ));
        }

        if self.sweep.enabled && self.sweep.interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "sweep.interval_seconds",
                "0",
                "sweep interval must be greater than 0 when the sweep is enabled",
            ));
        }

        Ok(())
    }

    /// Get database URL for the configured environment
    pub fn database_url(&self) -> String {
        self.database.database_url(&self.environment)
    }

    pub fn is_test_environment(&self) -> bool {
        self.environment == "test"
    }

    pub fn is_production_environment(&self) -> bool {
        self.environment == "production"
    }
}
