//! # Anonymization Sweep
//!
//! Periodic entry point that starts one anonymization chain for every closed
//! petition past the retention window. The first invocation of each chain
//! gets `timestamp = now`, so signatures created after the sweep ran are left
//! for a later chain. `now` is truncated to the microsecond precision
//! PostgreSQL stores, so the cutoff round-trips through the database intact.

use std::sync::Arc;

use chrono::{DateTime, Months, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::AnonymizationConfig;
use crate::constants::operations::ANONYMIZATION_SWEEP;
use crate::error::{EpetsError, Result};
use crate::log_job;
use crate::messaging::{AnonymizePetitionArgs, JobQueue};
use crate::repositories::PetitionRepository;

/// Petitions acted on by one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Petitions a chain was started for
    pub enqueued: Vec<i64>,
    /// Petitions that already had a chain waiting or running
    pub skipped: Vec<i64>,
}

pub struct AnonymizationSweep {
    petitions: Arc<dyn PetitionRepository>,
    queue: Arc<dyn JobQueue>,
    retention_months: u32,
    batch_limit: i64,
}

impl AnonymizationSweep {
    pub fn new(
        petitions: Arc<dyn PetitionRepository>,
        queue: Arc<dyn JobQueue>,
        config: &AnonymizationConfig,
    ) -> Self {
        Self {
            petitions,
            queue,
            retention_months: config.retention_months,
            batch_limit: config.batch_limit,
        }
    }

    /// Petitions closed before this instant are due for anonymization
    pub fn closed_before(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_sub_months(Months::new(self.retention_months))
            .ok_or_else(|| EpetsError::InvalidJobArguments {
                message: format!(
                    "retention of {} months before {now} is out of range",
                    self.retention_months
                ),
            })
    }

    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let now = now.trunc_subsecs(6);
        let closed_before = self.closed_before(now)?;
        let petitions = self.petitions.find_pending_anonymization(closed_before).await?;

        let mut report = SweepReport::default();
        for petition in petitions {
            if self.queue.has_pending_for_petition(petition.id).await? {
                report.skipped.push(petition.id);
                continue;
            }

            let args = AnonymizePetitionArgs::new(petition.id, now).with_limit(self.batch_limit);
            self.queue.send(&args).await?;
            report.enqueued.push(petition.id);
        }

        log_job!(info, ANONYMIZATION_SWEEP,
            closed_before: closed_before.to_rfc3339(),
            enqueued: report.enqueued.len(),
            skipped: report.skipped.len()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignatureState;
    use crate::test_helpers::{InMemoryJobQueue, InMemoryStore};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 3, 31, 2, 0, 0).unwrap()
    }

    fn sweep(store: &Arc<InMemoryStore>, queue: &Arc<InMemoryJobQueue>) -> AnonymizationSweep {
        let config = AnonymizationConfig {
            batch_limit: 500,
            ..AnonymizationConfig::default()
        };
        AnonymizationSweep::new(store.clone(), queue.clone(), &config)
    }

    #[test]
    fn test_retention_is_calendar_months() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());

        // 31 March minus six months clamps to the end of September
        assert_eq!(
            sweep(&store, &queue).closed_before(now()).unwrap(),
            Utc.with_ymd_and_hms(2018, 9, 30, 2, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_cutoff_is_truncated_to_microseconds() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let old = store.insert_petition(Utc.with_ymd_and_hms(2018, 6, 30, 0, 0, 0).unwrap());

        let precise = now() + chrono::Duration::nanoseconds(123_456_789);
        sweep(&store, &queue).run(precise).await.unwrap();

        let sent = queue.sent();
        assert_eq!(sent[0].petition_id, old);
        assert_eq!(
            sent[0].timestamp,
            now() + chrono::Duration::nanoseconds(123_456_000)
        );
    }

    #[tokio::test]
    async fn test_enqueues_petitions_past_retention() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let old = store.insert_petition(Utc.with_ymd_and_hms(2018, 6, 30, 0, 0, 0).unwrap());
        let recent = store.insert_petition(Utc.with_ymd_and_hms(2019, 1, 15, 0, 0, 0).unwrap());
        store.insert_signature(old, SignatureState::Validated, Utc.with_ymd_and_hms(2018, 1, 2, 0, 0, 0).unwrap());

        let report = sweep(&store, &queue).run(now()).await.unwrap();

        assert_eq!(report.enqueued, vec![old]);
        assert!(report.skipped.is_empty());
        assert_eq!(
            queue.sent(),
            vec![AnonymizePetitionArgs::new(old, now()).with_limit(500)]
        );
        assert!(!queue.sent().iter().any(|args| args.petition_id == recent));
    }

    #[tokio::test]
    async fn test_skips_anonymized_and_pending_petitions() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let closed_at = Utc.with_ymd_and_hms(2018, 5, 1, 0, 0, 0).unwrap();
        let done = store.insert_petition(closed_at);
        let pending = store.insert_petition(closed_at);
        store.mark_anonymized(done, closed_at).await.unwrap();
        queue.send(&AnonymizePetitionArgs::new(pending, closed_at)).await.unwrap();

        let report = sweep(&store, &queue).run(now()).await.unwrap();

        assert!(report.enqueued.is_empty());
        assert_eq!(report.skipped, vec![pending]);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_second_sweep_does_not_duplicate_chains() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let petition = store.insert_petition(Utc.with_ymd_and_hms(2018, 6, 30, 0, 0, 0).unwrap());
        let sweep = sweep(&store, &queue);

        sweep.run(now()).await.unwrap();
        let second = sweep.run(now()).await.unwrap();

        assert_eq!(second.skipped, vec![petition]);
        assert_eq!(queue.sent().len(), 1);
    }
}
