/// Durable decision log seam.
///
/// The scheduler never owns persistence. It appends each accepted decision to
/// a `DecisionStore` before touching memory, and rebuilds sessions by
/// replaying what `load` returns. The per-reviewer quota a session runs with
/// is stored alongside, so a reopened session keeps its targets.
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::types::Decision;

/// Identifies one question session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionKey {
    pub project_id: String,
    pub question_id: String,
}

impl SessionKey {
    pub fn new(project_id: impl Into<String>, question_id: impl Into<String>) -> Self {
        SessionKey {
            project_id: project_id.into(),
            question_id: question_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.question_id)
    }
}

/// Append-only decision log, shared across sessions.
pub trait DecisionStore: Send + Sync {
    /// Durably append one decision. On error nothing may have been recorded.
    fn append(&self, key: &SessionKey, decision: &Decision) -> Result<(), StoreError>;

    /// Every decision for `key`, in append order.
    fn load(&self, key: &SessionKey) -> Result<Vec<Decision>, StoreError>;

    /// Durably record the per-reviewer quota for `key`. A later call replaces it.
    fn save_quota(&self, key: &SessionKey, per_reviewer_quota: usize) -> Result<(), StoreError>;

    /// The quota last saved for `key`, if any.
    fn load_quota(&self, key: &SessionKey) -> Result<Option<usize>, StoreError>;
}

/// In-process store. Useful for tests and for single-process deployments
/// that accept losing history on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    log: Mutex<HashMap<SessionKey, SessionLog>>,
}

#[derive(Debug, Default)]
struct SessionLog {
    quota: Option<usize>,
    decisions: Vec<Decision>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of decisions stored for `key`.
    pub fn len(&self, key: &SessionKey) -> usize {
        self.log
            .lock()
            .map(|log| log.get(key).map_or(0, |s| s.decisions.len()))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionKey, SessionLog>>, StoreError> {
        self.log
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl DecisionStore for MemoryStore {
    fn append(&self, key: &SessionKey, decision: &Decision) -> Result<(), StoreError> {
        self.lock()?.entry(key.clone()).or_default().decisions.push(decision.clone());
        Ok(())
    }

    fn load(&self, key: &SessionKey) -> Result<Vec<Decision>, StoreError> {
        Ok(self.lock()?.get(key).map(|s| s.decisions.clone()).unwrap_or_default())
    }

    fn save_quota(&self, key: &SessionKey, per_reviewer_quota: usize) -> Result<(), StoreError> {
        self.lock()?.entry(key.clone()).or_default().quota = Some(per_reviewer_quota);
        Ok(())
    }

    fn load_quota(&self, key: &SessionKey) -> Result<Option<usize>, StoreError> {
        Ok(self.lock()?.get(key).and_then(|s| s.quota))
    }
}
