//! Repeated-failure monitoring.
//!
//! A signature that fails validation stays unanonymized and is selected again
//! by every later batch. The tracker counts consecutive failures per signature
//! so that a record stuck in that loop raises an alert instead of producing an
//! endless stream of identical reports.

use dashmap::DashMap;
use tracing::warn;

#[derive(Debug)]
pub struct FailureTracker {
    failures: DashMap<i64, u32>,
    alert_threshold: u32,
}

impl FailureTracker {
    pub fn new(alert_threshold: u32) -> Self {
        Self {
            failures: DashMap::new(),
            alert_threshold: alert_threshold.max(1),
        }
    }

    pub fn alert_threshold(&self) -> u32 {
        self.alert_threshold
    }

    /// Record a failure, returning the new consecutive failure count
    pub fn record_failure(&self, petition_id: i64, signature_id: i64) -> u32 {
        let count = {
            let mut entry = self.failures.entry(signature_id).or_insert(0);
            *entry += 1;
            *entry
        };

        if self.is_repeated(count) {
            warn!(
                petition_id,
                signature_id,
                failure_count = count,
                alert_threshold = self.alert_threshold,
                "Signature repeatedly failed anonymization and needs manual repair"
            );
        }

        count
    }

    /// Clear the count after the signature was anonymized
    pub fn record_success(&self, signature_id: i64) {
        self.failures.remove(&signature_id);
    }

    pub fn is_repeated(&self, failure_count: u32) -> bool {
        failure_count >= self.alert_threshold
    }

    pub fn failure_count(&self, signature_id: i64) -> u32 {
        self.failures
            .get(&signature_id)
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Number of signatures currently failing
    pub fn failing_signatures(&self) -> usize {
        self.failures.len()
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_FAILURE_ALERT_THRESHOLD)
    }
}
