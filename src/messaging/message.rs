//! # Queue Message Structures
//!
//! Payloads carried by the anonymization queue and the envelope returned when
//! they are read back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_BATCH_LIMIT;

/// Arguments of one `AnonymizePetitionJob` invocation.
///
/// A rescheduled invocation carries exactly the same arguments as the one that
/// enqueued it, so `timestamp` stays fixed for the whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizePetitionArgs {
    pub petition_id: i64,
    /// Cutoff: only signatures created strictly before it are anonymized
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_BATCH_LIMIT
}

impl AnonymizePetitionArgs {
    pub fn new(petition_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            petition_id,
            timestamp,
            limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// A message read from the queue, shaped like a pgmq message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage<T> {
    pub msg_id: i64,
    /// Number of times the message has been read, including this read
    pub read_ct: i32,
    pub enqueued_at: DateTime<Utc>,
    /// Time at which the message becomes visible to readers again
    pub vt: DateTime<Utc>,
    pub message: T,
}

impl<T> QueueMessage<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueueMessage<U> {
        QueueMessage {
            msg_id: self.msg_id,
            read_ct: self.read_ct,
            enqueued_at: self.enqueued_at,
            vt: self.vt,
            message: f(self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_args_serialize_timestamp_as_rfc3339() {
        let timestamp = Utc.with_ymd_and_hms(2018, 12, 31, 0, 0, 0).unwrap();
        let args = AnonymizePetitionArgs::new(12, timestamp).with_limit(2);

        let json = serde_json::to_value(args).unwrap();
        assert_eq!(json["petition_id"], 12);
        assert_eq!(json["timestamp"], "2018-12-31T00:00:00Z");
        assert_eq!(json["limit"], 2);
    }

    #[test]
    fn test_missing_limit_defaults() {
        let args: AnonymizePetitionArgs = serde_json::from_value(serde_json::json!({
            "petition_id": 3,
            "timestamp": "2018-12-31T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(args.limit, DEFAULT_BATCH_LIMIT);
        assert_eq!(args.timestamp, Utc.with_ymd_and_hms(2018, 12, 31, 0, 0, 0).unwrap());
    }
}
