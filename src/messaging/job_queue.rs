//! # Job Queue
//!
//! The [`JobQueue`] trait is the seam between the anonymization jobs and the
//! queue infrastructure. [`PgJobQueue`] implements it with the pgmq client
//! over a shared connection pool:
//!
//! - `send` enqueues a message that is immediately visible
//! - `read` claims visible messages, hides them for the visibility timeout
//!   and bumps `read_ct`
//! - `delete` acknowledges a message
//! - `archive` moves a message to the queue's `pgmq.a_<name>` table
//!
//! A message that is read but never deleted or archived becomes visible again
//! once its visibility timeout passes, giving at-least-once delivery.

use async_trait::async_trait;
use pgmq::{types::Message, PGMQueue};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use super::errors::QueueError;
use super::message::{AnonymizePetitionArgs, QueueMessage};

const MAX_QUEUE_NAME_LENGTH: usize = 47;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Name of the queue messages are sent to
    fn queue_name(&self) -> &str;

    /// Enqueue an invocation for asynchronous execution, returning its message id
    async fn send(&self, args: &AnonymizePetitionArgs) -> Result<i64, QueueError>;

    /// Claim up to `qty` visible messages, hiding them for `visibility_timeout_seconds`
    async fn read(
        &self,
        visibility_timeout_seconds: i32,
        qty: i32,
    ) -> Result<Vec<QueueMessage<serde_json::Value>>, QueueError>;

    /// Acknowledge a processed message
    async fn delete(&self, msg_id: i64) -> Result<bool, QueueError>;

    /// Move a message that cannot be processed out of the live queue
    async fn archive(&self, msg_id: i64) -> Result<bool, QueueError>;

    /// Whether a message for this petition is waiting or in flight
    async fn has_pending_for_petition(&self, petition_id: i64) -> Result<bool, QueueError>;
}

/// Queue depth snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub queue_name: String,
    pub queue_length: i64,
    pub oldest_msg_age_seconds: Option<i64>,
}

impl From<Message<serde_json::Value>> for QueueMessage<serde_json::Value> {
    fn from(message: Message<serde_json::Value>) -> Self {
        QueueMessage {
            msg_id: message.msg_id,
            read_ct: message.read_ct,
            enqueued_at: message.enqueued_at,
            vt: message.vt,
            message: message.message,
        }
    }
}

/// pgmq-backed implementation of [`JobQueue`]
#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pgmq: PGMQueue,
    queue_name: String,
}

impl PgJobQueue {
    /// Open the queue over an existing connection pool, creating its tables
    /// if they do not exist yet
    pub async fn new(pool: PgPool, queue_name: impl Into<String>) -> Result<Self, QueueError> {
        let queue_name = queue_name.into();
        validate_queue_name(&queue_name)?;

        let pgmq = PGMQueue::new_with_pool(pool).await;
        pgmq.create(&queue_name)
            .await
            .map_err(|e| QueueError::queue_operation(&queue_name, "create", e.to_string()))?;

        info!(queue = %queue_name, "Queue ready");
        Ok(Self { pgmq, queue_name })
    }

    /// Get reference to underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pgmq.connection
    }

    /// Table holding the live messages. The name is validated on construction.
    fn queue_table(&self) -> String {
        format!("pgmq.q_{}", self.queue_name)
    }

    /// Get queue depth and the age of the oldest message
    pub async fn queue_metrics(&self) -> Result<QueueMetrics, QueueError> {
        let sql = format!(
            "SELECT COUNT(*), EXTRACT(EPOCH FROM (NOW() - MIN(enqueued_at)))::float8 FROM {}",
            self.queue_table()
        );
        let (queue_length, oldest_msg_age_seconds): (i64, Option<f64>) = sqlx::query_as(&sql)
            .fetch_one(self.pool())
            .await
            .map_err(|e| QueueError::database_query("queue_metrics", e.to_string()))?;

        Ok(QueueMetrics {
            queue_name: self.queue_name.clone(),
            queue_length,
            oldest_msg_age_seconds: oldest_msg_age_seconds.map(|age| age as i64),
        })
    }

    /// Delete all messages in the queue
    pub async fn purge(&self) -> Result<u64, QueueError> {
        warn!(queue = %self.queue_name, "Purging queue");

        self.pgmq
            .purge(&self.queue_name)
            .await
            .map_err(|e| QueueError::queue_operation(&self.queue_name, "purge", e.to_string()))
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    #[instrument(skip(self, args), fields(queue = %self.queue_name, petition_id = args.petition_id))]
    async fn send(&self, args: &AnonymizePetitionArgs) -> Result<i64, QueueError> {
        let msg_id = self
            .pgmq
            .send(&self.queue_name, args)
            .await
            .map_err(|e| QueueError::queue_operation(&self.queue_name, "send", e.to_string()))?;

        info!(msg_id, "Message sent to queue");
        Ok(msg_id)
    }

    #[instrument(skip(self), fields(queue = %self.queue_name))]
    async fn read(
        &self,
        visibility_timeout_seconds: i32,
        qty: i32,
    ) -> Result<Vec<QueueMessage<serde_json::Value>>, QueueError> {
        let batch = self
            .pgmq
            .read_batch::<serde_json::Value>(&self.queue_name, Some(visibility_timeout_seconds), qty)
            .await
            .map_err(|e| QueueError::queue_operation(&self.queue_name, "read", e.to_string()))?
            .unwrap_or_default();

        let mut messages: Vec<QueueMessage<serde_json::Value>> =
            batch.into_iter().map(QueueMessage::from).collect();
        messages.sort_by_key(|message| message.msg_id);

        debug!(count = messages.len(), "Read messages from queue");
        Ok(messages)
    }

    #[instrument(skip(self), fields(queue = %self.queue_name))]
    async fn delete(&self, msg_id: i64) -> Result<bool, QueueError> {
        let deleted = self
            .pgmq
            .delete(&self.queue_name, msg_id)
            .await
            .map_err(|e| QueueError::queue_operation(&self.queue_name, "delete", e.to_string()))?;

        debug!(msg_id, "Message deleted");
        Ok(deleted > 0)
    }

    #[instrument(skip(self), fields(queue = %self.queue_name))]
    async fn archive(&self, msg_id: i64) -> Result<bool, QueueError> {
        let archived = self
            .pgmq
            .archive(&self.queue_name, msg_id)
            .await
            .map_err(|e| QueueError::queue_operation(&self.queue_name, "archive", e.to_string()))?;

        warn!(msg_id, "Message archived");
        Ok(archived > 0)
    }

    async fn has_pending_for_petition(&self, petition_id: i64) -> Result<bool, QueueError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE (message->>'petition_id')::bigint = $1)",
            self.queue_table()
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(petition_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| QueueError::database_query("has_pending_for_petition", e.to_string()))
    }
}

fn validate_queue_name(queue_name: &str) -> Result<(), QueueError> {
    if queue_name.is_empty() {
        return Err(QueueError::invalid_queue_name(queue_name, "must not be empty"));
    }

    if queue_name.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(QueueError::invalid_queue_name(
            queue_name,
            format!("must be at most {MAX_QUEUE_NAME_LENGTH} characters"),
        ));
    }

    if !queue_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(QueueError::invalid_queue_name(
            queue_name,
            "may only contain ASCII letters, digits and underscores",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_validation() {
        assert!(validate_queue_name("archived_anonymize_petition").is_ok());
        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("archived-anonymize").is_err());
        assert!(validate_queue_name(&"q".repeat(MAX_QUEUE_NAME_LENGTH + 1)).is_err());
    }
}
