#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # E-Petitions Core Rust
//!
//! Archival jobs for the petitions service, starting with the anonymization
//! of signatures on archived petitions.
//!
//! ## Overview
//!
//! Once a petition has been closed for the retention period, the personal
//! data of everyone who signed it is scrubbed. Petitions can carry millions
//! of signatures, so the work is split into bounded batches: each job
//! invocation anonymizes up to `limit` signatures and re-enqueues itself
//! until none remain, then stamps the petition as anonymized.
//!
//! ## Module Organization
//!
//! - [`jobs`] - The anonymization job, queue worker and periodic sweep
//! - [`models`] - Archived petition and signature rows with their SQL
//! - [`repositories`] - Datastore traits used by the jobs
//! - [`messaging`] - PostgreSQL-backed job queue
//! - [`validation`] - Checks run on anonymized signatures before saving
//! - [`error_reporting`] - Error-tracking sink and repeated-failure tracking
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - Structured logging setup and macros
//! - [`error`] - Crate error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use epets_core::jobs::AnonymizePetitionJob;
//! use epets_core::messaging::{AnonymizePetitionArgs, PgJobQueue};
//! use epets_core::repositories::{PgPetitionRepository, PgSignatureRepository};
//! use epets_core::error_reporting::TracingErrorReporter;
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let queue = Arc::new(PgJobQueue::new(pool.clone(), "archived_anonymize_petition").await?);
//! let job = AnonymizePetitionJob::new(
//!     Arc::new(PgSignatureRepository::new(pool.clone())),
//!     Arc::new(PgPetitionRepository::new(pool)),
//!     queue,
//!     Arc::new(TracingErrorReporter),
//! );
//!
//! job.perform_later(AnonymizePetitionArgs::new(42, Utc::now())).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Unit tests run against in-memory collaborators; integration tests use
//! SQLx native testing with a fresh database per test:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests (needs DATABASE_URL)
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod error_reporting;
pub mod jobs;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod repositories;
pub mod test_helpers;
pub mod validation;

pub use config::{ConfigManager, ConfigurationError, EpetsConfig};
pub use error::{EpetsError, Result};
pub use jobs::{
    AnonymizationOutcome, AnonymizationSweep, AnonymizePetitionJob, JobWorker, NextStep,
    SweepReport,
};
pub use messaging::{AnonymizePetitionArgs, JobQueue, PgJobQueue};
pub use models::{Petition, Signature, SignatureState};
pub use validation::{SignatureValidationConfig, SignatureValidator, ValidationError};
