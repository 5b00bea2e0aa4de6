//! # Anonymize Petition Job
//!
//! Anonymizes one bounded batch of an archived petition's signatures, then
//! either reschedules itself for the rest or marks the petition anonymized.
//!
//! ## Execution model
//!
//! ```text
//! perform(petition, T, limit)
//!   ├─ select ≤ limit signatures: not anonymized AND created_at < T
//!   ├─ for each: anonymize → validate → save   (failures reported, batch continues)
//!   └─ any eligible signatures left?
//!        ├─ yes → enqueue perform(petition, T, limit)
//!        └─ no  → petition.anonymized_at = T (if unset)
//! ```
//!
//! The cutoff `T` is passed in rather than read from the clock, so every
//! invocation of a chain works towards the same fixed target. Eligibility is
//! keyed on `anonymized_at IS NULL`, which only ever shrinks, so re-running an
//! invocation is safe.
//!
//! A signature that fails validation keeps `anonymized_at = NULL` and is
//! selected again by the next invocation. Each failure is reported; the
//! [`FailureTracker`] flags signatures that keep failing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::constants::operations::{ANONYMIZE_PETITION, ANONYMIZE_SIGNATURE};
use crate::error::{EpetsError, Result};
use crate::error_reporting::{ErrorReport, ErrorReporter, FailureTracker};
use crate::log_job;
use crate::messaging::{AnonymizePetitionArgs, JobQueue};
use crate::models::Signature;
use crate::repositories::{PetitionRepository, SignatureRepository};
use crate::validation::SignatureValidator;

/// What happened after the batch was processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextStep {
    /// Eligible signatures remain; a follow-up invocation was enqueued
    Rescheduled { msg_id: i64 },
    /// Nothing eligible remains. `marked` is false when the petition already
    /// carried an `anonymized_at` timestamp.
    Completed { marked: bool },
}

/// Result of a single invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizationOutcome {
    pub petition_id: i64,
    /// Signatures selected for this batch
    pub selected: usize,
    /// Signatures anonymized and saved by this invocation
    pub anonymized: usize,
    /// Signatures another invocation anonymized first
    pub skipped: usize,
    /// Signatures that failed validation or could not be saved
    pub failed: usize,
    pub next: NextStep,
}

impl AnonymizationOutcome {
    pub fn is_rescheduled(&self) -> bool {
        matches!(self.next, NextStep::Rescheduled { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.next, NextStep::Completed { .. })
    }
}

/// Batched, self-rescheduling anonymization of an archived petition
pub struct AnonymizePetitionJob {
    signatures: Arc<dyn SignatureRepository>,
    petitions: Arc<dyn PetitionRepository>,
    queue: Arc<dyn JobQueue>,
    reporter: Arc<dyn ErrorReporter>,
    validator: SignatureValidator,
    failures: Arc<FailureTracker>,
}

impl AnonymizePetitionJob {
    pub fn new(
        signatures: Arc<dyn SignatureRepository>,
        petitions: Arc<dyn PetitionRepository>,
        queue: Arc<dyn JobQueue>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            signatures,
            petitions,
            queue,
            reporter,
            validator: SignatureValidator::default(),
            failures: Arc::new(FailureTracker::default()),
        }
    }

    pub fn with_validator(mut self, validator: SignatureValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_failure_tracker(mut self, failures: Arc<FailureTracker>) -> Self {
        self.failures = failures;
        self
    }

    pub fn failure_tracker(&self) -> &Arc<FailureTracker> {
        &self.failures
    }

    /// Enqueue an invocation for asynchronous execution
    pub async fn perform_later(&self, args: AnonymizePetitionArgs) -> Result<i64> {
        Ok(self.queue.send(&args).await?)
    }

    /// Run one invocation.
    ///
    /// Per-signature failures never fail the invocation. Database errors
    /// outside the per-signature step and enqueue failures are returned.
    #[instrument(skip(self), fields(petition_id = args.petition_id, limit = args.limit))]
    pub async fn perform(&self, args: AnonymizePetitionArgs) -> Result<AnonymizationOutcome> {
        if args.limit <= 0 {
            return Err(EpetsError::InvalidJobArguments {
                message: format!("limit must be positive, got {}", args.limit),
            });
        }

        let petition_id = args.petition_id;
        let timestamp = args.timestamp;

        if self.petitions.find_by_id(petition_id).await?.is_none() {
            return Err(EpetsError::PetitionNotFound { petition_id });
        }

        let batch = self
            .signatures
            .find_anonymizable(petition_id, timestamp, args.limit)
            .await?;

        let selected = batch.len();
        let mut anonymized = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for signature in &batch {
            match self.anonymize_signature(signature, timestamp).await {
                Ok(true) => {
                    anonymized += 1;
                    self.failures.record_success(signature.id);
                }
                Ok(false) => {
                    skipped += 1;
                    self.failures.record_success(signature.id);
                }
                Err(error) => {
                    failed += 1;
                    self.report_signature_failure(petition_id, signature.id, &error);
                }
            }
        }

        let next = if self
            .petitions
            .has_anonymizable_signatures(petition_id, timestamp)
            .await?
        {
            let msg_id = self.queue.send(&args).await?;
            NextStep::Rescheduled { msg_id }
        } else {
            let marked = self.petitions.mark_anonymized(petition_id, timestamp).await?;
            NextStep::Completed { marked }
        };

        log_job!(info, ANONYMIZE_PETITION,
            petition_id: petition_id,
            cutoff: timestamp.to_rfc3339(),
            selected: selected,
            anonymized: anonymized,
            skipped: skipped,
            failed: failed,
            next: next
        );

        Ok(AnonymizationOutcome {
            petition_id,
            selected,
            anonymized,
            skipped,
            failed,
            next,
        })
    }

    async fn anonymize_signature(
        &self,
        signature: &Signature,
        timestamp: DateTime<Utc>,
    ) -> Result<bool> {
        let anonymized = signature.anonymize(timestamp);
        self.validator.validate_anonymized(&anonymized)?;
        Ok(self.signatures.save_anonymized(&anonymized).await?)
    }

    fn report_signature_failure(&self, petition_id: i64, signature_id: i64, error: &EpetsError) {
        let failure_count = self.failures.record_failure(petition_id, signature_id);
        let repeated = self.failures.is_repeated(failure_count);

        self.reporter.report(
            ErrorReport::new(error.kind(), error, ANONYMIZE_SIGNATURE)
                .with_petition(petition_id)
                .with_signature(signature_id)
                .with_failure_count(failure_count, repeated),
        );
    }
}
