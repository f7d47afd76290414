//! In-memory session store — the default, process-lifetime only.

use async_trait::async_trait;
use mcpagent_core::error::SessionError;
use mcpagent_core::message::Message;
use mcpagent_core::session::{Session, SessionId, SessionLocks, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps every session in a map. Nothing survives a restart.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    locks: SessionLocks,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            locks: SessionLocks::new(),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    async fn load(&self, id: &SessionId) -> Result<Session, SessionError> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(session.clone());
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        Ok(session.clone())
    }

    async fn append_and_save(
        &self,
        id: &SessionId,
        messages: Vec<Message>,
    ) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        session.append(messages);
        Ok(session.clone())
    }

    async fn reset(&self, id: &SessionId) -> Result<(), SessionError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, SessionError> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
