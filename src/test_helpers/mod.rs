// Test Helpers Module - Testing Infrastructure
//
// In-memory collaborators for exercising the jobs without a database, plus the
// migrator and database helpers used by the SQLx integration tests.

pub mod in_memory;
pub mod test_utils;

pub use in_memory::{
    perform_enqueued_jobs, InMemoryJobQueue, InMemoryStore, RecordingErrorReporter,
};

pub use test_utils::MIGRATOR;
