//! # Queue Error Types
//!
//! Structured errors for job queue operations using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database query error: {operation}: {message}")]
    DatabaseQuery { operation: String, message: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: msg_id {msg_id}: {message}")]
    MessageDeserialization { msg_id: i64, message: String },

    #[error("Invalid queue name: {queue_name}: {reason}")]
    InvalidQueueName { queue_name: String, reason: String },

    #[error("Message {msg_id} read {read_ct} times, exceeding the limit of {max_read_count}")]
    MaxReadCountExceeded {
        msg_id: i64,
        read_ct: i32,
        max_read_count: i32,
    },
}

impl QueueError {
    /// Create a database query error
    pub fn database_query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatabaseQuery {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(msg_id: i64, message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            msg_id,
            message: message.into(),
        }
    }

    /// Create an invalid queue name error
    pub fn invalid_queue_name(queue_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQueueName {
            queue_name: queue_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an error for a message delivered too many times
    pub fn max_read_count_exceeded(msg_id: i64, read_ct: i32, max_read_count: i32) -> Self {
        Self::MaxReadCountExceeded {
            msg_id,
            read_ct,
            max_read_count,
        }
    }

    /// Errors that redelivering the same message cannot fix
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MessageSerialization { .. }
                | Self::MessageDeserialization { .. }
                | Self::InvalidQueueName { .. }
                | Self::MaxReadCountExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let error = QueueError::queue_operation("archived_anonymize_petition", "send", "pool closed");
        assert_eq!(
            error.to_string(),
            "Queue operation failed: archived_anonymize_petition: send: pool closed"
        );
        assert!(!error.is_permanent());
    }

    #[test]
    fn test_deserialization_is_permanent() {
        let error = QueueError::message_deserialization(9, "missing field `petition_id`");
        assert!(error.is_permanent());
        assert!(error.to_string().contains("msg_id 9"));
    }
}
