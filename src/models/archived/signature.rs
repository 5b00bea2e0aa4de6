//! # Archived Signature Model
//!
//! A citizen's endorsement of an archived petition.
//!
//! ## Database Schema
//!
//! Maps to the `archived_signatures` table:
//! - `id`: Primary key (BIGSERIAL)
//! - `petition_id`: Owning petition (BIGINT)
//! - `state`: Validation state (`pending`, `validated`, `fraudulent`, `invalidated`)
//! - `name`, `email`, `ip_address`, `uuid`: Personally identifying fields
//! - `postcode`, `location_code`, `constituency_id`: Location data kept for statistics
//! - `anonymized_at`: Set once when the personal fields are scrubbed
//!
//! ## Anonymization
//!
//! [`Signature::anonymize`] is a pure transformation returning a scrubbed copy.
//! Persisting the copy goes through [`Signature::save_anonymized`], whose
//! `UPDATE` is guarded by `anonymized_at IS NULL` so a timestamp is never
//! overwritten.
//!
//! The batch scan relies on the partial index over
//! `(petition_id, created_at, id) WHERE anonymized_at IS NULL`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Validation state of a signature.
///
/// Every state is eligible for anonymization once the petition has been
/// archived long enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureState {
    Pending,
    Validated,
    Fraudulent,
    Invalidated,
}

impl SignatureState {
    pub const ALL: [SignatureState; 4] = [
        SignatureState::Pending,
        SignatureState::Validated,
        SignatureState::Fraudulent,
        SignatureState::Invalidated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureState::Pending => "pending",
            SignatureState::Validated => "validated",
            SignatureState::Fraudulent => "fraudulent",
            SignatureState::Invalidated => "invalidated",
        }
    }
}

impl fmt::Display for SignatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SignatureState::Pending),
            "validated" => Ok(SignatureState::Validated),
            "fraudulent" => Ok(SignatureState::Fraudulent),
            "invalidated" => Ok(SignatureState::Invalidated),
            other => Err(format!("Unknown signature state: {other}")),
        }
    }
}

/// Represents a row of `archived_signatures`.
///
/// `state` is kept as text so that rows carrying an unexpected state can still
/// be loaded; validation rejects them before anything is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Signature {
    pub id: i64,
    pub petition_id: i64,
    pub state: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub postcode: Option<String>,
    pub location_code: Option<String>,
    pub constituency_id: Option<String>,
    pub ip_address: Option<String>,
    pub uuid: Option<Uuid>,
    pub notify_by_email: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub anonymized_at: Option<DateTime<Utc>>,
}

/// New signature for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSignature {
    pub petition_id: i64,
    pub state: SignatureState,
    pub name: Option<String>,
    pub email: Option<String>,
    pub postcode: Option<String>,
    pub location_code: Option<String>,
    pub constituency_id: Option<String>,
    pub ip_address: Option<String>,
    pub uuid: Option<Uuid>,
    pub notify_by_email: bool,
    pub created_at: DateTime<Utc>,
}

impl NewSignature {
    /// A fully populated signature for a UK signer
    pub fn for_petition(petition_id: i64, state: SignatureState, created_at: DateTime<Utc>) -> Self {
        Self {
            petition_id,
            state,
            name: Some("Suzie Signer".to_string()),
            email: Some("suzie@example.com".to_string()),
            postcode: Some("SW1A 1AA".to_string()),
            location_code: Some("GB".to_string()),
            constituency_id: Some("3415".to_string()),
            ip_address: Some("192.168.1.1".to_string()),
            uuid: Some(Uuid::new_v4()),
            notify_by_email: true,
            created_at,
        }
    }
}

const SIGNATURE_COLUMNS: &str = "id, petition_id, state, name, email, postcode, location_code, \
     constituency_id, ip_address, uuid, notify_by_email, created_at, updated_at, anonymized_at";

impl Signature {
    /// Parsed validation state
    pub fn parsed_state(&self) -> Result<SignatureState, String> {
        self.state.parse()
    }

    pub fn is_anonymized(&self) -> bool {
        self.anonymized_at.is_some()
    }

    /// Whether this signature falls inside a run with the given cutoff
    pub fn is_anonymizable_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.anonymized_at.is_none() && self.created_at < cutoff
    }

    /// Return a copy with personal data scrubbed and `anonymized_at` stamped.
    ///
    /// The postcode is reduced to its outward code so that regional
    /// statistics survive; location and constituency are retained as-is.
    pub fn anonymize(&self, at: DateTime<Utc>) -> Signature {
        Signature {
            name: None,
            email: None,
            ip_address: None,
            uuid: None,
            notify_by_email: false,
            postcode: self.postcode.as_deref().and_then(outward_code),
            updated_at: at,
            anonymized_at: Some(at),
            ..self.clone()
        }
    }

    /// Create a new signature
    pub async fn create(pool: &PgPool, new_signature: NewSignature) -> Result<Signature, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO archived_signatures (
                petition_id, state, name, email, postcode, location_code, constituency_id,
                ip_address, uuid, notify_by_email, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {SIGNATURE_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Signature>(&sql)
            .bind(new_signature.petition_id)
            .bind(new_signature.state.as_str())
            .bind(new_signature.name)
            .bind(new_signature.email)
            .bind(new_signature.postcode)
            .bind(new_signature.location_code)
            .bind(new_signature.constituency_id)
            .bind(new_signature.ip_address)
            .bind(new_signature.uuid)
            .bind(new_signature.notify_by_email)
            .bind(new_signature.created_at)
            .fetch_one(pool)
            .await
    }

    /// Find a signature by ID
    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Signature>, sqlx::Error> {
        let sql = format!("SELECT {SIGNATURE_COLUMNS} FROM archived_signatures WHERE id = $1");

        sqlx::query_as::<_, Signature>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Next batch of signatures awaiting anonymization, oldest first.
    ///
    /// Ordering by `(created_at, id)` keeps successive invocations moving
    /// forward without an explicit offset.
    pub async fn not_anonymized_before(
        pool: &PgPool,
        petition_id: i64,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Signature>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {SIGNATURE_COLUMNS}
            FROM archived_signatures
            WHERE petition_id = $1
              AND anonymized_at IS NULL
              AND created_at < $2
            ORDER BY created_at ASC, id ASC
            LIMIT $3
            "#
        );

        sqlx::query_as::<_, Signature>(&sql)
            .bind(petition_id)
            .bind(before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Whether any signature of the petition is still awaiting anonymization
    pub async fn exists_not_anonymized_before(
        pool: &PgPool,
        petition_id: i64,
        before: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM archived_signatures
                WHERE petition_id = $1
                  AND anonymized_at IS NULL
                  AND created_at < $2
            )
            "#,
        )
        .bind(petition_id)
        .bind(before)
        .fetch_one(pool)
        .await
    }

    /// Count of all signatures on a petition that are still identifiable
    pub async fn count_not_anonymized(pool: &PgPool, petition_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM archived_signatures WHERE petition_id = $1 AND anonymized_at IS NULL",
        )
        .bind(petition_id)
        .fetch_one(pool)
        .await
    }

    /// Persist the scrubbed fields of an anonymized copy.
    ///
    /// Returns `false` when the row was already anonymized (or no longer
    /// exists), leaving the stored timestamp untouched.
    pub async fn save_anonymized(&self, pool: &PgPool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE archived_signatures
            SET name = $2,
                email = $3,
                postcode = $4,
                ip_address = $5,
                uuid = $6,
                notify_by_email = $7,
                anonymized_at = $8,
                updated_at = $9
            WHERE id = $1
              AND anonymized_at IS NULL
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.email)
        .bind(&self.postcode)
        .bind(&self.ip_address)
        .bind(self.uuid)
        .bind(self.notify_by_email)
        .bind(self.anonymized_at)
        .bind(self.updated_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Clear the location code (used to reproduce legacy rows with missing data)
    pub async fn clear_location_code(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE archived_signatures SET location_code = NULL WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// Outward half of a UK postcode, normalised: `"sw1a 1aa"` becomes `"SW1A"`.
///
/// Values too short to carry an inward code are kept whole; blank values
/// become `None`.
pub fn outward_code(postcode: &str) -> Option<String> {
    let normalised: String = postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if normalised.is_empty() {
        return None;
    }

    let char_count = normalised.chars().count();
    if char_count <= 4 {
        return Some(normalised);
    }

    Some(normalised.chars().take(char_count - 3).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signature() -> Signature {
        let created_at = Utc.with_ymd_and_hms(2018, 1, 1, 12, 0, 0).unwrap();
        Signature {
            id: 1,
            petition_id: 7,
            state: "validated".to_string(),
            name: Some("Suzie Signer".to_string()),
            email: Some("suzie@example.com".to_string()),
            postcode: Some("sw1a 1aa".to_string()),
            location_code: Some("GB".to_string()),
            constituency_id: Some("3415".to_string()),
            ip_address: Some("192.168.1.1".to_string()),
            uuid: Some(Uuid::new_v4()),
            notify_by_email: true,
            created_at,
            updated_at: created_at,
            anonymized_at: None,
        }
    }

    #[test]
    fn test_anonymize_scrubs_personal_fields() {
        let at = Utc.with_ymd_and_hms(2018, 12, 31, 0, 0, 0).unwrap();
        let anonymized = signature().anonymize(at);

        assert_eq!(anonymized.name, None);
        assert_eq!(anonymized.email, None);
        assert_eq!(anonymized.ip_address, None);
        assert_eq!(anonymized.uuid, None);
        assert!(!anonymized.notify_by_email);
        assert_eq!(anonymized.postcode.as_deref(), Some("SW1A"));
        assert_eq!(anonymized.anonymized_at, Some(at));
        assert_eq!(anonymized.updated_at, at);
    }

    #[test]
    fn test_anonymize_keeps_statistical_fields() {
        let original = signature();
        let anonymized = original.anonymize(Utc::now());

        assert_eq!(anonymized.id, original.id);
        assert_eq!(anonymized.petition_id, original.petition_id);
        assert_eq!(anonymized.state, original.state);
        assert_eq!(anonymized.location_code, original.location_code);
        assert_eq!(anonymized.constituency_id, original.constituency_id);
        assert_eq!(anonymized.created_at, original.created_at);
    }

    #[test]
    fn test_cutoff_is_strict() {
        let original = signature();
        assert!(!original.is_anonymizable_before(original.created_at));
        assert!(original.is_anonymizable_before(original.created_at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_outward_code() {
        assert_eq!(outward_code("SW1A 1AA").as_deref(), Some("SW1A"));
        assert_eq!(outward_code("m1 1ae").as_deref(), Some("M1"));
        assert_eq!(outward_code("  ").as_deref(), None);
        assert_eq!(outward_code("BFPO").as_deref(), Some("BFPO"));
    }

    #[test]
    fn test_state_parsing() {
        for state in SignatureState::ALL {
            assert_eq!(state.as_str().parse::<SignatureState>(), Ok(state));
        }
        assert!("unconfirmed".parse::<SignatureState>().is_err());
    }
}
