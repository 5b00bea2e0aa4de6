//! Broadcast reporter for forwarding error reports to an external tracker.

use tokio::sync::broadcast;

use super::reporter::{ErrorReport, ErrorReporter};

/// High-throughput error report publisher
#[derive(Debug, Clone)]
pub struct BroadcastErrorReporter {
    sender: broadcast::Sender<ErrorReport>,
}

impl BroadcastErrorReporter {
    /// Create a new reporter with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to reports
    pub fn subscribe(&self) -> broadcast::Receiver<ErrorReport> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ErrorReporter for BroadcastErrorReporter {
    fn report(&self, report: ErrorReport) {
        // No subscribers is fine; a lagging subscriber loses the oldest reports
        if self.sender.send(report).is_err() {
            tracing::trace!("Error report dropped: no subscribers");
        }
    }
}

impl Default for BroadcastErrorReporter {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EpetsError;

    #[tokio::test]
    async fn test_subscribers_receive_reports() {
        let reporter = BroadcastErrorReporter::new(16);
        let mut receiver = reporter.subscribe();
        assert_eq!(reporter.subscriber_count(), 1);

        let error = EpetsError::PetitionNotFound { petition_id: 9 };
        reporter.report(ErrorReport::new(error.kind(), &error, "process_message").with_message_id(4));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.error_kind, "petition_not_found");
        assert_eq!(received.msg_id, Some(4));
    }

    #[test]
    fn test_report_without_subscribers_does_not_panic() {
        let reporter = BroadcastErrorReporter::default();
        let error = EpetsError::PetitionNotFound { petition_id: 9 };
        reporter.report(ErrorReport::new(error.kind(), &error, "process_message"));
        assert_eq!(reporter.subscriber_count(), 0);
    }
}
