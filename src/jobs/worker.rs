//! # Job Worker
//!
//! Polls the anonymization queue and runs each message through
//! [`AnonymizePetitionJob::perform`].
//!
//! | Result of a message                        | Action                  |
//! |--------------------------------------------|-------------------------|
//! | perform succeeded                          | delete                  |
//! | transient error (database, queue)          | leave for redelivery    |
//! | permanent error (bad payload, no petition) | archive and report      |
//! | delivered more than `max_read_count` times | archive and report      |
//!
//! Messages are processed one at a time, so a single worker never runs two
//! invocations of the same chain concurrently.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::config::QueueConfig;
use crate::constants::operations::PROCESS_MESSAGE;
use crate::error::{EpetsError, Result};
use crate::error_reporting::{ErrorReport, ErrorReporter};
use crate::log_queue;
use crate::messaging::{AnonymizePetitionArgs, JobQueue, QueueError, QueueMessage};

use super::anonymize_petition::{AnonymizationOutcome, AnonymizePetitionJob};

/// What the worker did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Performed successfully and deleted
    Completed(AnonymizationOutcome),
    /// Failed transiently; becomes visible again after the visibility timeout
    Retained,
    /// Failed permanently and moved to the archive
    Archived,
}

pub struct JobWorker {
    job: Arc<AnonymizePetitionJob>,
    queue: Arc<dyn JobQueue>,
    reporter: Arc<dyn ErrorReporter>,
    config: QueueConfig,
}

impl JobWorker {
    pub fn new(
        job: Arc<AnonymizePetitionJob>,
        queue: Arc<dyn JobQueue>,
        reporter: Arc<dyn ErrorReporter>,
        config: QueueConfig,
    ) -> Self {
        Self {
            job,
            queue,
            reporter,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    ///
    /// Errors from a poll are logged and the loop backs off for one poll
    /// interval. A message being processed when shutdown is requested is
    /// finished first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        log_queue!(info, "worker_started", queue: self.queue.queue_name(),
            poll_interval_ms: self.config.poll_interval_ms,
            read_batch_size: self.config.read_batch_size
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.poll_once().await {
                Ok(processed) => processed == 0,
                Err(error) => {
                    log_queue!(error, "poll_failed", queue: self.queue.queue_name(),
                        error: error.to_string()
                    );
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        log_queue!(info, "worker_stopped", queue: self.queue.queue_name(),);
    }

    /// Read one batch of visible messages and process them in order.
    ///
    /// A message that cannot be deleted or archived is logged and skipped; it
    /// reappears after its visibility timeout. Returns the number of messages
    /// read.
    pub async fn poll_once(&self) -> Result<usize> {
        let messages = self
            .queue
            .read(
                self.config.visibility_timeout_seconds,
                self.config.read_batch_size,
            )
            .await?;

        let count = messages.len();
        for message in messages {
            let msg_id = message.msg_id;
            if let Err(error) = self.process_message(message).await {
                log_queue!(error, "acknowledge_failed", queue: self.queue.queue_name(),
                    msg_id: msg_id,
                    error: error.to_string()
                );
            }
        }

        Ok(count)
    }

    /// Perform a single message and acknowledge, keep or archive it.
    ///
    /// Only failures to delete or archive the message are returned.
    #[instrument(skip(self, message), fields(msg_id = message.msg_id, read_ct = message.read_ct))]
    pub async fn process_message(
        &self,
        message: QueueMessage<serde_json::Value>,
    ) -> Result<MessageDisposition> {
        let msg_id = message.msg_id;

        if message.read_ct > self.config.max_read_count {
            let error = EpetsError::from(QueueError::max_read_count_exceeded(
                msg_id,
                message.read_ct,
                self.config.max_read_count,
            ));
            let petition_id = message
                .message
                .get("petition_id")
                .and_then(serde_json::Value::as_i64);
            return self.archive(msg_id, petition_id, &error).await;
        }

        let args: AnonymizePetitionArgs = match serde_json::from_value(message.message) {
            Ok(args) => args,
            Err(e) => {
                let error = EpetsError::from(QueueError::message_deserialization(msg_id, e.to_string()));
                return self.archive(msg_id, None, &error).await;
            }
        };

        match self.job.perform(args).await {
            Ok(outcome) => {
                self.queue.delete(msg_id).await?;
                debug!(msg_id, petition_id = args.petition_id, "Message completed");
                Ok(MessageDisposition::Completed(outcome))
            }
            Err(error) if error.is_permanent() => {
                self.archive(msg_id, Some(args.petition_id), &error).await
            }
            Err(error) => {
                warn!(
                    msg_id,
                    petition_id = args.petition_id,
                    error_kind = error.kind(),
                    error = %error,
                    "Message failed, leaving it for redelivery"
                );
                self.reporter.report(
                    ErrorReport::new(error.kind(), &error, PROCESS_MESSAGE)
                        .with_petition(args.petition_id)
                        .with_message_id(msg_id),
                );
                Ok(MessageDisposition::Retained)
            }
        }
    }

    async fn archive(
        &self,
        msg_id: i64,
        petition_id: Option<i64>,
        error: &EpetsError,
    ) -> Result<MessageDisposition> {
        self.queue.archive(msg_id).await?;

        log_queue!(warn, "message_archived", queue: self.queue.queue_name(),
            msg_id: msg_id,
            petition_id: petition_id,
            error_kind: error.kind(),
            error: error.to_string()
        );

        let mut report = ErrorReport::new(error.kind(), error, PROCESS_MESSAGE).with_message_id(msg_id);
        if let Some(petition_id) = petition_id {
            report = report.with_petition(petition_id);
        }
        self.reporter.report(report);

        Ok(MessageDisposition::Archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignatureState;
    use crate::test_helpers::{InMemoryJobQueue, InMemoryStore, RecordingErrorReporter};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryStore>,
        queue: Arc<InMemoryJobQueue>,
        reporter: Arc<RecordingErrorReporter>,
        worker: JobWorker,
        petition_id: i64,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let reporter = Arc::new(RecordingErrorReporter::new());

        let petition_id = store.insert_petition(Utc.with_ymd_and_hms(2018, 6, 30, 0, 0, 0).unwrap());
        for day in 1..=3 {
            store.insert_signature(
                petition_id,
                SignatureState::Validated,
                Utc.with_ymd_and_hms(2018, 3, day, 9, 0, 0).unwrap(),
            );
        }

        let job = Arc::new(AnonymizePetitionJob::new(
            store.clone(),
            store.clone(),
            queue.clone(),
            reporter.clone(),
        ));
        let config = QueueConfig {
            poll_interval_ms: 10,
            max_read_count: 2,
            ..QueueConfig::default()
        };
        let worker = JobWorker::new(job, queue.clone(), reporter.clone(), config);

        Harness {
            store,
            queue,
            reporter,
            worker,
            petition_id,
        }
    }

    fn args(petition_id: i64) -> AnonymizePetitionArgs {
        AnonymizePetitionArgs::new(petition_id, Utc.with_ymd_and_hms(2018, 12, 31, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_successful_message_is_deleted() {
        let h = harness();
        let msg_id = h.queue.send(&args(h.petition_id)).await.unwrap();

        let processed = tokio_test::assert_ok!(h.worker.poll_once().await);

        assert_eq!(processed, 1);
        assert_eq!(h.queue.deleted(), vec![msg_id]);
        assert!(h.queue.is_empty());
        assert_eq!(h.store.not_anonymized_count(h.petition_id), 0);
        assert!(h.reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_message_is_archived_and_reported() {
        let h = harness();
        let msg_id = h.queue.push_raw(serde_json::json!({ "petition": "unknown" }));

        h.worker.poll_once().await.unwrap();

        assert_eq!(h.queue.archived(), vec![msg_id]);
        let reports = h.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].error_kind, "queue");
        assert_eq!(reports[0].msg_id, Some(msg_id));
        assert_eq!(reports[0].operation, "process_message");
    }

    #[tokio::test]
    async fn test_missing_petition_is_archived() {
        let h = harness();
        let msg_id = h.queue.send(&args(h.petition_id + 1_000)).await.unwrap();

        h.worker.poll_once().await.unwrap();

        assert_eq!(h.queue.archived(), vec![msg_id]);
        let reports = h.reporter.reports();
        assert_eq!(reports[0].error_kind, "petition_not_found");
        assert_eq!(reports[0].petition_id, Some(h.petition_id + 1_000));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retained_for_redelivery() {
        let h = harness();
        let msg_id = h.queue.send(&args(h.petition_id).with_limit(1)).await.unwrap();
        h.queue.fail_sends(true);

        h.worker.poll_once().await.unwrap();

        assert!(h.queue.deleted().is_empty());
        assert!(h.queue.archived().is_empty());
        assert_eq!(h.queue.read_count(msg_id), Some(1));
        assert_eq!(h.reporter.reports()[0].error_kind, "queue");

        // Hidden until the visibility timeout passes
        assert_eq!(h.worker.poll_once().await.unwrap(), 0);

        h.queue.fail_sends(false);
        h.queue.expire_visibility();
        h.worker.poll_once().await.unwrap();
        assert_eq!(h.queue.deleted(), vec![msg_id]);
    }

    #[tokio::test]
    async fn test_message_over_read_limit_is_archived() {
        let h = harness();
        let msg_id = h.queue.send(&args(h.petition_id).with_limit(1)).await.unwrap();
        h.queue.fail_sends(true);

        for _ in 0..2 {
            h.worker.poll_once().await.unwrap();
            h.queue.expire_visibility();
        }
        assert!(h.queue.archived().is_empty());

        h.worker.poll_once().await.unwrap();

        assert_eq!(h.queue.archived(), vec![msg_id]);
        let last = h.reporter.reports().pop().unwrap();
        assert!(last.message.contains("read 3 times"));
        assert_eq!(last.petition_id, Some(h.petition_id));
    }

    #[tokio::test]
    async fn test_acknowledge_failure_does_not_abandon_batch() {
        let h = harness();
        let first = h.queue.push_raw(serde_json::json!({ "petition": "unknown" }));
        let second = h.queue.send(&args(h.petition_id)).await.unwrap();
        h.queue.fail_acks(true);

        let processed = tokio_test::assert_ok!(h.worker.poll_once().await);

        // Both messages were worked on even though neither could be acknowledged
        assert_eq!(processed, 2);
        assert_eq!(h.store.not_anonymized_count(h.petition_id), 0);
        assert_eq!(h.queue.read_count(first), Some(1));
        assert_eq!(h.queue.read_count(second), Some(1));

        h.queue.fail_acks(false);
        h.queue.expire_visibility();
        h.worker.poll_once().await.unwrap();
        assert_eq!(h.queue.archived(), vec![first]);
        assert_eq!(h.queue.deleted(), vec![second]);
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops_on_shutdown() {
        let h = harness();
        h.queue.send(&args(h.petition_id).with_limit(1)).await.unwrap();
        let worker = Arc::new(h.worker);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run(shutdown_rx).await }
        });

        for _ in 0..100 {
            if h.store.petition(h.petition_id).unwrap().anonymized_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.store.not_anonymized_count(h.petition_id), 0);
        assert!(h.store.petition(h.petition_id).unwrap().anonymized_at.is_some());
        // One invocation per signature with limit 1
        assert_eq!(h.queue.deleted().len(), 3);
        assert!(h.queue.is_empty());
    }
}
