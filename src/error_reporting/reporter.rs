use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An exception report sent to the error-tracking sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Unique id of this report, for correlating log lines and tracker entries
    pub report_id: Uuid,
    /// Category of the originating error (`validation`, `database`, ...)
    pub error_kind: String,
    pub message: String,
    /// Operation during which the error happened
    pub operation: String,
    pub petition_id: Option<i64>,
    pub signature_id: Option<i64>,
    pub msg_id: Option<i64>,
    /// Consecutive failures seen for `signature_id` in this process
    pub failure_count: u32,
    /// Set once `failure_count` has reached the alert threshold
    pub repeated: bool,
    pub reported_at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(
        error_kind: impl Into<String>,
        error: &(dyn std::error::Error + 'static),
        operation: impl Into<String>,
    ) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            error_kind: error_kind.into(),
            message: error.to_string(),
            operation: operation.into(),
            petition_id: None,
            signature_id: None,
            msg_id: None,
            failure_count: 0,
            repeated: false,
            reported_at: Utc::now(),
        }
    }

    pub fn with_petition(mut self, petition_id: i64) -> Self {
        self.petition_id = Some(petition_id);
        self
    }

    pub fn with_signature(mut self, signature_id: i64) -> Self {
        self.signature_id = Some(signature_id);
        self
    }

    pub fn with_message_id(mut self, msg_id: i64) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    pub fn with_failure_count(mut self, failure_count: u32, repeated: bool) -> Self {
        self.failure_count = failure_count;
        self.repeated = repeated;
        self
    }
}

/// Error-tracking sink
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: ErrorReport);
}

/// Reports errors as structured log events
#[derive(Debug, Clone, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, report: ErrorReport) {
        tracing::error!(
            report_id = %report.report_id,
            error_kind = %report.error_kind,
            operation = %report.operation,
            petition_id = ?report.petition_id,
            signature_id = ?report.signature_id,
            msg_id = ?report.msg_id,
            failure_count = report.failure_count,
            repeated = report.repeated,
            "{}", report.message
        );
    }
}
