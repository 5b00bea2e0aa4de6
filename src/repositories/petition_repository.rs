//! Petition access for completion checks and the anonymization sweep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{Petition, Signature};

#[async_trait]
pub trait PetitionRepository: Send + Sync {
    async fn find_by_id(&self, petition_id: i64) -> Result<Option<Petition>, sqlx::Error>;

    /// Whether any signature created before `before` is still not anonymized
    async fn has_anonymizable_signatures(
        &self,
        petition_id: i64,
        before: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>;

    /// Set `anonymized_at` if it is unset; `true` when this call wrote it
    async fn mark_anonymized(
        &self,
        petition_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>;

    /// Closed petitions not yet anonymized whose closing date precedes `closed_before`
    async fn find_pending_anonymization(
        &self,
        closed_before: DateTime<Utc>,
    ) -> Result<Vec<Petition>, sqlx::Error>;
}

#[derive(Debug, Clone)]
pub struct PgPetitionRepository {
    pool: PgPool,
}

impl PgPetitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PetitionRepository for PgPetitionRepository {
    async fn find_by_id(&self, petition_id: i64) -> Result<Option<Petition>, sqlx::Error> {
        Petition::find_by_id(&self.pool, petition_id).await
    }

    async fn has_anonymizable_signatures(
        &self,
        petition_id: i64,
        before: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        Signature::exists_not_anonymized_before(&self.pool, petition_id, before).await
    }

    async fn mark_anonymized(
        &self,
        petition_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        Petition::mark_anonymized(&self.pool, petition_id, at).await
    }

    async fn find_pending_anonymization(
        &self,
        closed_before: DateTime<Utc>,
    ) -> Result<Vec<Petition>, sqlx::Error> {
        Petition::not_anonymized_closed_before(&self.pool, closed_before).await
    }
}
