//! Signature access for the anonymization batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::Signature;

#[async_trait]
pub trait SignatureRepository: Send + Sync {
    /// Up to `limit` signatures of the petition that are not anonymized and
    /// were created strictly before `before`, ordered by `(created_at, id)`
    async fn find_anonymizable(
        &self,
        petition_id: i64,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Signature>, sqlx::Error>;

    /// Persist an anonymized copy.
    ///
    /// Returns `false` without writing when the stored row is already
    /// anonymized.
    async fn save_anonymized(&self, signature: &Signature) -> Result<bool, sqlx::Error>;
}

#[derive(Debug, Clone)]
pub struct PgSignatureRepository {
    pool: PgPool,
}

impl PgSignatureRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignatureRepository for PgSignatureRepository {
    async fn find_anonymizable(
        &self,
        petition_id: i64,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Signature>, sqlx::Error> {
        Signature::not_anonymized_before(&self.pool, petition_id, before, limit).await
    }

    async fn save_anonymized(&self, signature: &Signature) -> Result<bool, sqlx::Error> {
        signature.save_anonymized(&self.pool).await
    }
}
