//! Session identity and snapshot lifecycle.

use crate::store::SnapshotStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;
use wayfarer_core::{CorrelationId, SessionError, Timestamp};

/// Fixed secure-store identity for the single snapshot slot.
pub const SNAPSHOT_SERVICE: &str = "dev.wayfarer.runtime";
pub const SNAPSHOT_ACCOUNT: &str = "journey-snapshot";

/// PII-free resume record. Step granularity only: no payloads, no tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub journey_id: String,
    pub step_pointer: String,
    pub idempotency_key: String,
    pub ts: Timestamp,
}

#[derive(Debug)]
struct SessionState {
    correlation_id: CorrelationId,
    context_token: Option<String>,
    resume_token: Option<String>,
    step_pointer: Option<String>,
    idempotency_key: String,
}

impl SessionState {
    fn fresh() -> Self {
        Self {
            correlation_id: CorrelationId::generate(),
            context_token: None,
            resume_token: None,
            step_pointer: None,
            idempotency_key: new_idempotency_key(),
        }
    }
}

/// Mutable, process-local session state. Outlives individual journeys.
///
/// Reads are concurrent, writes exclusive.
#[derive(Debug)]
pub struct SessionManager {
    state: RwLock<SessionState>,
    store: Arc<dyn SnapshotStore>,
}

impl SessionManager {
    /// Create a manager with fresh identifiers.
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            state: RwLock::new(SessionState::fresh()),
            store,
        }
    }

    /// Begin a session: fresh correlation and idempotency identifiers,
    /// caller-supplied authorization token, optional resume token.
    pub fn start_session(&self, context_token: &str, resume_token: Option<&str>) {
        let mut state = self.write();
        *state = SessionState::fresh();
        state.context_token = Some(context_token.to_string());
        state.resume_token = resume_token.map(str::to_string);
        tracing::debug!(correlation_id = %state.correlation_id, "session started");
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.read().correlation_id
    }

    pub fn context_token(&self) -> Option<String> {
        self.read().context_token.clone()
    }

    pub fn resume_token(&self) -> Option<String> {
        self.read().resume_token.clone()
    }

    pub fn step_pointer(&self) -> Option<String> {
        self.read().step_pointer.clone()
    }

    pub fn idempotency_key(&self) -> String {
        self.read().idempotency_key.clone()
    }

    /// Persist a snapshot for the current step. The previous slot value is
    /// unconditionally deleted before the write.
    pub fn save_snapshot(&self, journey_id: &str, step_id: &str) -> Result<(), SessionError> {
        let snapshot = {
            let mut state = self.write();
            state.step_pointer = Some(step_id.to_string());
            Snapshot {
                journey_id: journey_id.to_string(),
                step_pointer: step_id.to_string(),
                idempotency_key: state.idempotency_key.clone(),
                ts: Utc::now(),
            }
        };

        let data = serde_json::to_vec(&snapshot).map_err(|e| SessionError::SnapshotDecode {
            reason: e.to_string(),
        })?;

        self.store.delete(SNAPSHOT_SERVICE, SNAPSHOT_ACCOUNT);
        if !self.store.set(&data, SNAPSHOT_SERVICE, SNAPSHOT_ACCOUNT) {
            return Err(SessionError::StoreWriteFailed);
        }
        tracing::debug!(journey_id, step_id, "snapshot saved");
        Ok(())
    }

    /// Load the stored snapshot and bind `resume_token` to the session,
    /// restoring the step pointer and idempotency key.
    ///
    /// The resume token does not gate access to the slot: any caller that
    /// can present one sees the stored snapshot. An authenticated binding
    /// between token and snapshot is a known gap in this protocol version.
    pub fn load_snapshot(&self, resume_token: &str) -> Result<Snapshot, SessionError> {
        let data = self
            .store
            .get(SNAPSHOT_SERVICE, SNAPSHOT_ACCOUNT)
            .ok_or(SessionError::SnapshotNotFound)?;
        let snapshot: Snapshot =
            serde_json::from_slice(&data).map_err(|e| SessionError::SnapshotDecode {
                reason: e.to_string(),
            })?;

        let mut state = self.write();
        state.resume_token = Some(resume_token.to_string());
        state.step_pointer = Some(snapshot.step_pointer.clone());
        state.idempotency_key = snapshot.idempotency_key.clone();
        tracing::debug!(
            journey_id = %snapshot.journey_id,
            step_pointer = %snapshot.step_pointer,
            "snapshot restored"
        );
        Ok(snapshot)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn new_idempotency_key() -> String {
    Uuid::new_v4().simple().to_string()
}
