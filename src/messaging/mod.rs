//! # Messaging Module
//!
//! PostgreSQL-backed job queue used to dispatch and reschedule anonymization
//! jobs. Messages follow pgmq semantics: a read hides the message for a
//! visibility timeout, and a message that is neither deleted nor archived is
//! delivered again (at-least-once).

pub mod errors;
pub mod job_queue;
pub mod message;

pub use errors::QueueError;
pub use job_queue::{JobQueue, PgJobQueue};
pub use message::{AnonymizePetitionArgs, QueueMessage};
