//! # Jobs
//!
//! Background jobs over the petition archive.
//!
//! - [`AnonymizePetitionJob`]: batched, self-rescheduling anonymization of one
//!   petition's signatures
//! - [`JobWorker`]: queue consumer that runs the job and acknowledges messages
//! - [`AnonymizationSweep`]: periodic trigger that starts a chain for each
//!   petition past the retention window

pub mod anonymize_petition;
pub mod sweep;
pub mod worker;

pub use anonymize_petition::{AnonymizationOutcome, AnonymizePetitionJob, NextStep};
pub use sweep::{AnonymizationSweep, SweepReport};
pub use worker::{JobWorker, MessageDisposition};
