//! File-based session store — one JSON document per session.
//!
//! Storage location: a directory (by default `~/.mcpagent/sessions`), with
//! each session in `<encoded id>.json`. Writes go to a temporary file that
//! is renamed over the target, so a crash never leaves a half-written
//! session behind.

use async_trait::async_trait;
use mcpagent_core::error::SessionError;
use mcpagent_core::message::Message;
use mcpagent_core::session::{Session, SessionId, SessionLocks, SessionStore};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct FileSessionStore {
    dir: PathBuf,
    locks: SessionLocks,
    /// Serializes file I/O per session; separate from the run locks
    io_locks: SessionLocks,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File session store opened");
        Self {
            dir,
            locks: SessionLocks::new(),
            io_locks: SessionLocks::new(),
        }
    }

    /// Default directory: `~/.mcpagent/sessions`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".mcpagent").join("sessions")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id.as_str())))
    }

    async fn read(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write(&self, session: &Session) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SessionError::Storage(format!("Failed to create session directory: {e}"))
        })?;

        let path = self.path_for(&session.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(session)?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to write session file: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to replace session file: {e}")))?;
        Ok(())
    }
}

/// Encode a session id as a file stem.
///
/// ASCII letters, digits and `-` pass through; every other byte becomes
/// `_xx` (lowercase hex), so distinct ids never share a file. Stems longer
/// than [`MAX_STEM_LEN`] keep a prefix and end in `~<sha256 of the id>`,
/// which stays under the usual 255-byte file name limit.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{byte:02x}"));
        }
    }
    if stem.is_empty() {
        stem.push('_');
    }
    if stem.len() > MAX_STEM_LEN {
        // The stem is pure ASCII, so any byte index is a char boundary
        stem.truncate(HASHED_PREFIX_LEN);
        stem.push('~');
        stem.push_str(&format!("{:x}", Sha256::digest(id.as_bytes())));
    }
    stem
}

const MAX_STEM_LEN: usize = 160;
const HASHED_PREFIX_LEN: usize = 96;

#[async_trait]
impl SessionStore for FileSessionStore {
    fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    async fn load(&self, id: &SessionId) -> Result<Session, SessionError> {
        let _io = self.io_locks.acquire(id).await;
        match self.read(id).await? {
            Some(session) => Ok(session),
            None => {
                let session = Session::new(id.clone());
                self.write(&session).await?;
                Ok(session)
            }
        }
    }

    async fn append_and_save(
        &self,
        id: &SessionId,
        messages: Vec<Message>,
    ) -> Result<Session, SessionError> {
        let _io = self.io_locks.acquire(id).await;
        let mut session = self
            .read(id)
            .await?
            .unwrap_or_else(|| Session::new(id.clone()));
        session.append(messages);
        self.write(&session).await?;
        Ok(session)
    }

    async fn reset(&self, id: &SessionId) -> Result<(), SessionError> {
        let _io = self.io_locks.acquire(id).await;
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(format!("Failed to remove session file: {e}"))),
        }
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, SessionError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "Failed to list session directory: {e}"
                )));
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .ok()
                .and_then(|bytes| serde_json::from_slice::<Session>(&bytes).ok());
            match parsed {
                Some(session) => ids.push(session.id),
                None => warn!(path = %path.display(), "Skipping unreadable session file"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
