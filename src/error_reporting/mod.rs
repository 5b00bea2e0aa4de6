//! # Error Reporting
//!
//! The error-tracking sink used by the jobs. Reporting is synchronous and
//! fire-and-forget: a reporter never fails and never blocks the batch.
//!
//! - [`TracingErrorReporter`] writes each report as a structured `error!` event
//! - [`BroadcastErrorReporter`] fans reports out over a tokio broadcast channel
//!   so an external tracker integration can subscribe
//! - [`FailureTracker`] counts repeated failures for the same signature

pub mod failure_tracker;
pub mod publisher;
pub mod reporter;

pub use failure_tracker::FailureTracker;
pub use publisher::BroadcastErrorReporter;
pub use reporter::{ErrorReport, ErrorReporter, TracingErrorReporter};
