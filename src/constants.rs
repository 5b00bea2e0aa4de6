//! # System Constants
//!
//! Defaults and names shared by the anonymization jobs, the queue worker and
//! the configuration layer. Configuration files override the tunable values;
//! these are the values used when a setting is omitted.

/// Queue carrying `AnonymizePetitionArgs` messages
pub const ANONYMIZE_PETITION_QUEUE: &str = "archived_anonymize_petition";

/// Maximum signatures anonymized by a single job invocation
pub const DEFAULT_BATCH_LIMIT: i64 = 10_000;

/// Months after closing before a petition's signatures are anonymized
pub const DEFAULT_RETENTION_MONTHS: u32 = 6;

/// Consecutive failures for one signature before an alert is raised
pub const DEFAULT_FAILURE_ALERT_THRESHOLD: u32 = 3;

pub mod queue {
    /// Seconds a read message stays invisible to other readers
    pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: i32 = 300;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
    pub const DEFAULT_READ_BATCH_SIZE: i32 = 1;
    /// Deliveries allowed before a message is archived as poisoned
    pub const DEFAULT_MAX_READ_COUNT: i32 = 5;
}

pub mod sweep {
    /// Daily, matching the petition housekeeping cron cadence
    pub const DEFAULT_INTERVAL_SECONDS: u64 = 86_400;
}

/// Validation limits applied to anonymized signatures
pub mod validation {
    pub const MAX_LOCATION_CODE_LENGTH: usize = 30;
    pub const MAX_POSTCODE_LENGTH: usize = 255;
}

/// Operation names used in structured logs and error reports
pub mod operations {
    pub const ANONYMIZE_SIGNATURE: &str = "anonymize_signature";
    pub const ANONYMIZE_PETITION: &str = "anonymize_petition";
    pub const PROCESS_MESSAGE: &str = "process_message";
    pub const ANONYMIZATION_SWEEP: &str = "anonymization_sweep";
}
