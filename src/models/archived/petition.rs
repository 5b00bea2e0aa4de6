//! # Archived Petition Model
//!
//! Closed petitions moved into the archive. The anonymization jobs only read a
//! petition's identity and closing date and write `anonymized_at` once.
//!
//! Maps to the `archived_petitions` table:
//! - `id`: Primary key (BIGSERIAL)
//! - `action`: Petition title
//! - `state`: Lifecycle state owned by the petitions web application
//! - `closed_at`: When signing closed (nullable for petitions never opened)
//! - `anonymized_at`: Set when no identifiable signatures remain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Petition {
    pub id: i64,
    pub action: String,
    pub state: String,
    pub closed_at: Option<DateTime<Utc>>,
    pub anonymized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New Petition for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPetition {
    pub action: String,
    pub state: String,
    pub closed_at: Option<DateTime<Utc>>,
}

impl NewPetition {
    pub fn closed(action: impl Into<String>, closed_at: DateTime<Utc>) -> Self {
        Self {
            action: action.into(),
            state: "closed".to_string(),
            closed_at: Some(closed_at),
        }
    }
}

const PETITION_COLUMNS: &str =
    "id, action, state, closed_at, anonymized_at, created_at, updated_at";

impl Petition {
    pub fn is_anonymized(&self) -> bool {
        self.anonymized_at.is_some()
    }

    /// Create a new petition
    pub async fn create(pool: &PgPool, new_petition: NewPetition) -> Result<Petition, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO archived_petitions (action, state, closed_at, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            RETURNING {PETITION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Petition>(&sql)
            .bind(new_petition.action)
            .bind(new_petition.state)
            .bind(new_petition.closed_at)
            .fetch_one(pool)
            .await
    }

    /// Find a petition by ID
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Petition>, sqlx::Error> {
        let sql = format!("SELECT {PETITION_COLUMNS} FROM archived_petitions WHERE id = $1");

        sqlx::query_as::<_, Petition>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Closed petitions still holding identifiable signatures, oldest closure first
    pub async fn not_anonymized_closed_before(
        pool: &PgPool,
        closed_before: DateTime<Utc>,
    ) -> Result<Vec<Petition>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {PETITION_COLUMNS}
            FROM archived_petitions
            WHERE anonymized_at IS NULL
              AND closed_at IS NOT NULL
              AND closed_at < $1
            ORDER BY closed_at ASC, id ASC
            "#
        );

        sqlx::query_as::<_, Petition>(&sql)
            .bind(closed_before)
            .fetch_all(pool)
            .await
    }

    /// Stamp `anonymized_at` unless a previous run already did.
    ///
    /// Returns `true` only for the call that performed the write.
    pub async fn mark_anonymized(
        pool: &PgPool,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE archived_petitions
            SET anonymized_at = $2, updated_at = NOW()
            WHERE id = $1
              AND anonymized_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
