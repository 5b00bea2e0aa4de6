//! Shared fixtures for the database integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use epets_core::config::QueueConfig;
use epets_core::jobs::{AnonymizePetitionJob, JobWorker};
use epets_core::messaging::PgJobQueue;
use epets_core::models::{NewPetition, NewSignature, Petition, Signature, SignatureState};
use epets_core::repositories::{PgPetitionRepository, PgSignatureRepository};
use epets_core::test_helpers::RecordingErrorReporter;
use sqlx::PgPool;

pub const QUEUE_NAME: &str = "archived_anonymize_petition";

/// Message tables pgmq creates for [`QUEUE_NAME`]
pub const QUEUE_TABLE: &str = "pgmq.q_archived_anonymize_petition";
pub const ARCHIVE_TABLE: &str = "pgmq.a_archived_anonymize_petition";

/// Cutoff used by most scenarios: the petition closed well before it
pub fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 12, 31, 0, 0, 0).unwrap()
}

pub async fn create_closed_petition(pool: &PgPool) -> Petition {
    Petition::create(
        pool,
        NewPetition::closed(
            "Do something about archived signatures",
            Utc.with_ymd_and_hms(2018, 6, 30, 23, 59, 59).unwrap(),
        ),
    )
    .await
    .unwrap()
}

/// Create `count` signatures one hour apart starting at `first_created_at`
pub async fn create_signatures(
    pool: &PgPool,
    petition_id: i64,
    state: SignatureState,
    first_created_at: DateTime<Utc>,
    count: i64,
) -> Vec<Signature> {
    let mut signatures = Vec::new();
    for n in 0..count {
        let new_signature =
            NewSignature::for_petition(petition_id, state, first_created_at + Duration::hours(n));
        signatures.push(Signature::create(pool, new_signature).await.unwrap());
    }
    signatures
}

/// The job and its collaborators wired against `pool`
pub struct Fixture {
    pub pool: PgPool,
    pub queue: Arc<PgJobQueue>,
    pub reporter: Arc<RecordingErrorReporter>,
    pub job: Arc<AnonymizePetitionJob>,
}

impl Fixture {
    pub async fn new(pool: PgPool) -> Self {
        let queue = Arc::new(PgJobQueue::new(pool.clone(), QUEUE_NAME).await.unwrap());
        let reporter = Arc::new(RecordingErrorReporter::new());
        let job = Arc::new(AnonymizePetitionJob::new(
            Arc::new(PgSignatureRepository::new(pool.clone())),
            Arc::new(PgPetitionRepository::new(pool.clone())),
            queue.clone(),
            reporter.clone(),
        ));

        Self {
            pool,
            queue,
            reporter,
            job,
        }
    }

    pub fn worker(&self) -> JobWorker {
        JobWorker::new(
            self.job.clone(),
            self.queue.clone(),
            self.reporter.clone(),
            QueueConfig::default(),
        )
    }

    /// Process queued messages until none are visible, returning how many ran
    pub async fn drain_queue(&self) -> usize {
        let worker = self.worker();
        let mut processed = 0;
        for _ in 0..1_000 {
            match worker.poll_once().await.unwrap() {
                0 => break,
                n => processed += n,
            }
        }
        processed
    }

    pub async fn signatures(&self, petition_id: i64) -> Vec<Signature> {
        sqlx::query_as::<_, Signature>(
            r#"
            SELECT id, petition_id, state, name, email, postcode, location_code,
                   constituency_id, ip_address, uuid, notify_by_email,
                   created_at, updated_at, anonymized_at
            FROM archived_signatures
            WHERE petition_id = $1
            ORDER BY id
            "#,
        )
        .bind(petition_id)
        .fetch_all(&self.pool)
        .await
        .unwrap()
    }
}
