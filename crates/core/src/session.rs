//! Session domain types and the session store trait.
//!
//! A session is a caller-identified conversation. The store owns every
//! session; a run borrows one session's history, and appends back through
//! [`SessionStore::append_and_save`] while holding that session's run lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use crate::error::SessionError;
use crate::message::{Message, Role};

/// Opaque, caller-supplied session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A conversation and its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Messages in chronological order
    #[serde(default)]
    pub history: Vec<Message>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append messages at the end and bump `updated_at`.
    pub fn append(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.history.extend(messages);
        self.updated_at = Utc::now();
    }

    /// Check that every tool result answers a call from the assistant turn
    /// immediately before its result block, and that every call is answered.
    pub fn tool_pairing_holds(&self) -> bool {
        let mut pending: HashSet<&str> = HashSet::new();
        let mut expected = 0usize;
        for message in &self.history {
            match message.role {
                Role::Tool => {
                    let Some(id) = message.tool_call_id.as_deref() else {
                        return false;
                    };
                    if !pending.remove(id) {
                        return false;
                    }
                }
                Role::Assistant | Role::User => {
                    if !pending.is_empty() {
                        return false;
                    }
                    if message.role == Role::Assistant {
                        pending = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
                        // Ids repeated within one turn cannot be paired unambiguously
                        if pending.len() != message.tool_calls.len() {
                            return false;
                        }
                        expected += message.tool_calls.len();
                    }
                }
            }
        }
        let results = self.history.iter().filter(|m| m.is_tool_result()).count();
        pending.is_empty() && results == expected
    }
}

/// Holds a session's run lock until dropped.
pub struct SessionGuard {
    session_id: SessionId,
    _guard: OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

/// Idle locks are swept once the table holds this many entries.
const MIN_SWEEP_AT: usize = 64;

struct LockTable {
    locks: HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>,
    /// Size at which the next sweep runs; twice the survivors of the last one
    sweep_at: usize,
}

impl Default for LockTable {
    fn default() -> Self {
        Self {
            locks: HashMap::new(),
            sweep_at: MIN_SWEEP_AT,
        }
    }
}

/// Per-session run locks: at most one in-flight run per session id, no
/// global lock across sessions.
#[derive(Default)]
pub struct SessionLocks {
    table: Mutex<LockTable>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = table.locks.get(id) {
            return lock.clone();
        }
        if table.locks.len() >= table.sweep_at {
            // A count of 1 means only the table references the lock
            table.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            table.sweep_at = (table.locks.len() * 2).max(MIN_SWEEP_AT);
        }
        table.locks.entry(id.clone()).or_default().clone()
    }

    /// Wait until the session is free, then hold it.
    pub async fn acquire(&self, id: &SessionId) -> SessionGuard {
        let lock = self.lock_for(id);
        SessionGuard {
            session_id: id.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Hold the session if it is free right now.
    pub fn try_acquire(&self, id: &SessionId) -> Option<SessionGuard> {
        let lock = self.lock_for(id);
        lock.try_lock_owned().ok().map(|guard| SessionGuard {
            session_id: id.clone(),
            _guard: guard,
        })
    }

    pub fn tracked(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .locks
            .len()
    }
}

/// Owns all session state.
///
/// Implementations serialize reads and appends per session; the run locks
/// exposed through [`SessionStore::acquire`] keep concurrent runs on one
/// session from interleaving.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The run locks for this store.
    fn locks(&self) -> &SessionLocks;

    /// Load a session, creating an empty one on first reference.
    async fn load(&self, id: &SessionId) -> Result<Session, SessionError>;

    /// Append messages to the end of a session's history and persist it.
    async fn append_and_save(
        &self,
        id: &SessionId,
        messages: Vec<Message>,
    ) -> Result<Session, SessionError>;

    /// Forget a session's history. Host-initiated only.
    async fn reset(&self, id: &SessionId) -> Result<(), SessionError>;

    /// Ids of every known session.
    async fn list_ids(&self) -> Result<Vec<SessionId>, SessionError>;

    /// Wait for exclusive access to a session.
    async fn acquire(&self, id: &SessionId) -> SessionGuard {
        self.locks().acquire(id).await
    }

    /// Exclusive access if no run is in flight on the session.
    fn try_acquire(&self, id: &SessionId) -> Option<SessionGuard> {
        self.locks().try_acquire(id)
    }
}
