//! # In-Memory Collaborators
//!
//! Implementations of the repository, queue and error-reporting seams backed
//! by process memory. They follow the same semantics as the PostgreSQL
//! implementations (ordering, `anonymized_at IS NULL` guards, visibility
//! timeouts) so the jobs behave identically against either.

use std::collections::{BTreeMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::Result;
use crate::error_reporting::{ErrorReport, ErrorReporter};
use crate::jobs::{AnonymizationOutcome, AnonymizePetitionJob};
use crate::messaging::{AnonymizePetitionArgs, JobQueue, QueueError, QueueMessage};
use crate::models::{NewSignature, Petition, Signature, SignatureState};
use crate::repositories::{PetitionRepository, SignatureRepository};

/// Upper bound on jobs run by [`perform_enqueued_jobs`]; a signature that
/// never validates would otherwise keep the chain alive forever.
const MAX_ENQUEUED_JOBS: usize = 1_000;

#[derive(Debug, Default)]
struct StoreState {
    next_id: i64,
    petitions: BTreeMap<i64, Petition>,
    signatures: BTreeMap<i64, Signature>,
    failing_saves: HashSet<i64>,
    raced_saves: HashSet<i64>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn anonymizable(&self, petition_id: i64, before: DateTime<Utc>) -> impl Iterator<Item = &Signature> {
        self.signatures
            .values()
            .filter(move |s| s.petition_id == petition_id && s.is_anonymizable_before(before))
    }
}

/// Petitions and signatures held in memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a closed petition, returning its id
    pub fn insert_petition(&self, closed_at: DateTime<Utc>) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        let now = Utc::now();
        state.petitions.insert(
            id,
            Petition {
                id,
                action: format!("Archived petition {id}"),
                state: "closed".to_string(),
                closed_at: Some(closed_at),
                anonymized_at: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Insert a fully populated signature, returning its id
    pub fn insert_signature(
        &self,
        petition_id: i64,
        signature_state: SignatureState,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let new = NewSignature::for_petition(petition_id, signature_state, created_at);
        let mut state = self.state.lock();
        let id = state.next_id();
        state.signatures.insert(
            id,
            Signature {
                id,
                petition_id,
                state: new.state.as_str().to_string(),
                name: new.name,
                email: new.email,
                postcode: new.postcode,
                location_code: new.location_code,
                constituency_id: new.constituency_id,
                ip_address: new.ip_address,
                uuid: new.uuid,
                notify_by_email: new.notify_by_email,
                created_at,
                updated_at: created_at,
                anonymized_at: None,
            },
        );
        id
    }

    /// Modify a stored signature in place, bypassing validation
    pub fn update_signature(&self, id: i64, update: impl FnOnce(&mut Signature)) {
        if let Some(signature) = self.state.lock().signatures.get_mut(&id) {
            update(signature);
        }
    }

    /// Make every save of this signature fail with a database error
    pub fn fail_saves_for(&self, id: i64) {
        self.state.lock().failing_saves.insert(id);
    }

    /// Make the next save of this signature find it already anonymized, as
    /// when another invocation got there first. Clears any simulated failure.
    pub fn lose_save_race_for(&self, id: i64) {
        let mut state = self.state.lock();
        state.failing_saves.remove(&id);
        state.raced_saves.insert(id);
    }

    pub fn petition(&self, id: i64) -> Option<Petition> {
        self.state.lock().petitions.get(&id).cloned()
    }

    pub fn signature(&self, id: i64) -> Option<Signature> {
        self.state.lock().signatures.get(&id).cloned()
    }

    /// All signatures of a petition, ordered by id
    pub fn signatures(&self, petition_id: i64) -> Vec<Signature> {
        self.state
            .lock()
            .signatures
            .values()
            .filter(|s| s.petition_id == petition_id)
            .cloned()
            .collect()
    }

    pub fn not_anonymized_count(&self, petition_id: i64) -> usize {
        self.state
            .lock()
            .signatures
            .values()
            .filter(|s| s.petition_id == petition_id && !s.is_anonymized())
            .count()
    }
}

#[async_trait]
impl SignatureRepository for InMemoryStore {
    async fn find_anonymizable(
        &self,
        petition_id: i64,
        before: DateTime<Utc>,
        limit: i64,
    ) -> std::result::Result<Vec<Signature>, sqlx::Error> {
        let state = self.state.lock();
        let mut batch: Vec<Signature> = state.anonymizable(petition_id, before).cloned().collect();
        batch.sort_by_key(|s| (s.created_at, s.id));
        batch.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(batch)
    }

    async fn save_anonymized(&self, signature: &Signature) -> std::result::Result<bool, sqlx::Error> {
        let mut state = self.state.lock();

        if state.failing_saves.contains(&signature.id) {
            return Err(sqlx::Error::Protocol(format!(
                "simulated failure saving signature {}",
                signature.id
            )));
        }

        let raced = state.raced_saves.remove(&signature.id);
        match state.signatures.get_mut(&signature.id) {
            Some(stored) if raced => {
                stored.anonymized_at = signature.anonymized_at;
                Ok(false)
            }
            Some(stored) if stored.anonymized_at.is_none() => {
                stored.name = signature.name.clone();
                stored.email = signature.email.clone();
                stored.postcode = signature.postcode.clone();
                stored.ip_address = signature.ip_address.clone();
                stored.uuid = signature.uuid;
                stored.notify_by_email = signature.notify_by_email;
                stored.anonymized_at = signature.anonymized_at;
                stored.updated_at = signature.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PetitionRepository for InMemoryStore {
    async fn find_by_id(&self, petition_id: i64) -> std::result::Result<Option<Petition>, sqlx::Error> {
        Ok(self.petition(petition_id))
    }

    async fn has_anonymizable_signatures(
        &self,
        petition_id: i64,
        before: DateTime<Utc>,
    ) -> std::result::Result<bool, sqlx::Error> {
        Ok(self.state.lock().anonymizable(petition_id, before).next().is_some())
    }

    async fn mark_anonymized(
        &self,
        petition_id: i64,
        at: DateTime<Utc>,
    ) -> std::result::Result<bool, sqlx::Error> {
        let mut state = self.state.lock();
        match state.petitions.get_mut(&petition_id) {
            Some(petition) if petition.anonymized_at.is_none() => {
                petition.anonymized_at = Some(at);
                petition.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_pending_anonymization(
        &self,
        closed_before: DateTime<Utc>,
    ) -> std::result::Result<Vec<Petition>, sqlx::Error> {
        let state = self.state.lock();
        let mut petitions: Vec<Petition> = state
            .petitions
            .values()
            .filter(|p| {
                p.anonymized_at.is_none() && p.closed_at.is_some_and(|closed| closed < closed_before)
            })
            .cloned()
            .collect();
        petitions.sort_by_key(|p| (p.closed_at, p.id));
        Ok(petitions)
    }
}

#[derive(Debug)]
struct StoredMessage {
    msg_id: i64,
    read_ct: i32,
    enqueued_at: DateTime<Utc>,
    vt: DateTime<Utc>,
    message: serde_json::Value,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: i64,
    messages: VecDeque<StoredMessage>,
    sent: Vec<AnonymizePetitionArgs>,
    deleted: Vec<i64>,
    archived: Vec<i64>,
    fail_sends: bool,
    fail_acks: bool,
}

/// Job queue held in memory with pgmq visibility semantics
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every argument set ever sent, in order
    pub fn sent(&self) -> Vec<AnonymizePetitionArgs> {
        self.state.lock().sent.clone()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.state.lock().deleted.clone()
    }

    pub fn archived(&self) -> Vec<i64> {
        self.state.lock().archived.clone()
    }

    /// Messages still in the queue, visible or not
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `send` fail as if the queue were unavailable
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Make `delete` and `archive` fail, leaving messages in the queue
    pub fn fail_acks(&self, fail: bool) {
        self.state.lock().fail_acks = fail;
    }

    /// Enqueue an arbitrary payload, bypassing serialization of job arguments
    pub fn push_raw(&self, message: serde_json::Value) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let msg_id = state.next_id;
        let now = Utc::now();
        state.messages.push_back(StoredMessage {
            msg_id,
            read_ct: 0,
            enqueued_at: now,
            vt: now,
            message,
        });
        msg_id
    }

    /// Make every hidden message visible again, as if its timeout had passed
    pub fn expire_visibility(&self) {
        let now = Utc::now();
        for message in self.state.lock().messages.iter_mut() {
            message.vt = now;
        }
    }

    /// Read count of a message still in the queue
    pub fn read_count(&self, msg_id: i64) -> Option<i32> {
        self.state
            .lock()
            .messages
            .iter()
            .find(|m| m.msg_id == msg_id)
            .map(|m| m.read_ct)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    fn queue_name(&self) -> &str {
        crate::constants::ANONYMIZE_PETITION_QUEUE
    }

    async fn send(&self, args: &AnonymizePetitionArgs) -> std::result::Result<i64, QueueError> {
        if self.state.lock().fail_sends {
            return Err(QueueError::queue_operation(
                self.queue_name(),
                "send",
                "queue unavailable",
            ));
        }

        let payload = serde_json::to_value(args)
            .map_err(|e| QueueError::message_serialization(e.to_string()))?;
        let msg_id = self.push_raw(payload);
        self.state.lock().sent.push(*args);
        Ok(msg_id)
    }

    async fn read(
        &self,
        visibility_timeout_seconds: i32,
        qty: i32,
    ) -> std::result::Result<Vec<QueueMessage<serde_json::Value>>, QueueError> {
        let now = Utc::now();
        let hidden_until = now + chrono::Duration::seconds(i64::from(visibility_timeout_seconds));
        let limit = usize::try_from(qty).unwrap_or(0);

        let mut state = self.state.lock();
        let messages = state
            .messages
            .iter_mut()
            .filter(|m| m.vt <= now)
            .take(limit)
            .map(|m| {
                m.read_ct += 1;
                m.vt = hidden_until;
                QueueMessage {
                    msg_id: m.msg_id,
                    read_ct: m.read_ct,
                    enqueued_at: m.enqueued_at,
                    vt: m.vt,
                    message: m.message.clone(),
                }
            })
            .collect();

        Ok(messages)
    }

    async fn delete(&self, msg_id: i64) -> std::result::Result<bool, QueueError> {
        let mut state = self.state.lock();
        if state.fail_acks {
            return Err(QueueError::queue_operation(
                crate::constants::ANONYMIZE_PETITION_QUEUE,
                "delete",
                "queue unavailable",
            ));
        }
        let before = state.messages.len();
        state.messages.retain(|m| m.msg_id != msg_id);
        let removed = state.messages.len() < before;
        if removed {
            state.deleted.push(msg_id);
        }
        Ok(removed)
    }

    async fn archive(&self, msg_id: i64) -> std::result::Result<bool, QueueError> {
        let mut state = self.state.lock();
        if state.fail_acks {
            return Err(QueueError::queue_operation(
                crate::constants::ANONYMIZE_PETITION_QUEUE,
                "archive",
                "queue unavailable",
            ));
        }
        let before = state.messages.len();
        state.messages.retain(|m| m.msg_id != msg_id);
        let removed = state.messages.len() < before;
        if removed {
            state.archived.push(msg_id);
        }
        Ok(removed)
    }

    async fn has_pending_for_petition(&self, petition_id: i64) -> std::result::Result<bool, QueueError> {
        Ok(self.state.lock().messages.iter().any(|m| {
            m.message.get("petition_id").and_then(serde_json::Value::as_i64) == Some(petition_id)
        }))
    }
}

/// Error reporter that keeps every report for later assertions
#[derive(Debug, Default)]
pub struct RecordingErrorReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for RecordingErrorReporter {
    fn report(&self, report: ErrorReport) {
        self.reports.lock().push(report);
    }
}

/// Run queued anonymization jobs until the queue is drained.
///
/// Jobs enqueued while draining are run too. Returns the outcome of every
/// invocation in execution order. Stops after a fixed number of invocations
/// so a chain that can never finish does not hang the test.
pub async fn perform_enqueued_jobs(
    job: &AnonymizePetitionJob,
    queue: &InMemoryJobQueue,
) -> Result<Vec<AnonymizationOutcome>> {
    let mut outcomes = Vec::new();

    while outcomes.len() < MAX_ENQUEUED_JOBS {
        let Some(message) = queue.read(30, 1).await?.into_iter().next() else {
            break;
        };

        let args: AnonymizePetitionArgs = serde_json::from_value(message.message)?;
        outcomes.push(job.perform(args).await?);
        queue.delete(message.msg_id).await?;
    }

    Ok(outcomes)
}
