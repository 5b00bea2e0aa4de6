//! # Error Types
//!
//! Crate-level error type shared by the repositories, the job queue and the
//! anonymization jobs. Layer-specific errors (`QueueError`, `ValidationError`,
//! `ConfigurationError`) convert into [`EpetsError`] with `?`.

use crate::config::ConfigurationError;
use crate::messaging::QueueError;
use crate::validation::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpetsError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Petition {petition_id} not found")]
    PetitionNotFound { petition_id: i64 },

    #[error("Invalid job arguments: {message}")]
    InvalidJobArguments { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl EpetsError {
    /// Whether retrying the same job message can never succeed.
    ///
    /// The worker archives messages that fail permanently instead of leaving
    /// them for redelivery.
    pub fn is_permanent(&self) -> bool {
        match self {
            EpetsError::PetitionNotFound { .. }
            | EpetsError::InvalidJobArguments { .. }
            | EpetsError::Serialization(_)
            | EpetsError::Configuration(_) => true,
            EpetsError::Queue(queue_error) => queue_error.is_permanent(),
            EpetsError::Database(_) | EpetsError::Validation(_) => false,
        }
    }

    /// Short machine-friendly label used in structured logs and error reports
    pub fn kind(&self) -> &'static str {
        match self {
            EpetsError::Database(_) => "database",
            EpetsError::Queue(_) => "queue",
            EpetsError::Validation(_) => "validation",
            EpetsError::PetitionNotFound { .. } => "petition_not_found",
            EpetsError::InvalidJobArguments { .. } => "invalid_job_arguments",
            EpetsError::Serialization(_) => "serialization",
            EpetsError::Configuration(_) => "configuration",
        }
    }
}

pub type Result<T> = std::result::Result<T, EpetsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_petition_is_permanent() {
        let error = EpetsError::PetitionNotFound { petition_id: 42 };
        assert!(error.is_permanent());
        assert_eq!(error.kind(), "petition_not_found");
        assert_eq!(error.to_string(), "Petition 42 not found");
    }

    #[test]
    fn test_database_errors_are_retried() {
        let error = EpetsError::Database(sqlx::Error::PoolTimedOut);
        assert!(!error.is_permanent());
        assert_eq!(error.kind(), "database");
    }

    #[test]
    fn test_undecodable_payload_is_permanent() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error = EpetsError::from(json_error);
        assert!(error.is_permanent());
    }
}
