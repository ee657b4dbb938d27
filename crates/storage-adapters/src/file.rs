//! # FileSessionRepository
//!
//! Ephemeral backend for development and tests: sessions live in a
//! `DashMap`, and after every mutation the whole map is written to a JSON
//! file so a restart picks up where it left off.
//!
//! Entry guards are never held across an `.await`; each mutation finishes
//! its in-memory change before the flush starts.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::{Result, Session, SessionRepository, StoreError};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub struct FileSessionRepository {
    sessions: DashMap<Uuid, Session>,
    /// Code → owning session id. Claiming a code is a single entry operation.
    codes: DashMap<String, Uuid>,
    path: Option<PathBuf>,
    retention: Duration,
    /// Serializes flushes so file writes never interleave.
    flush_lock: Mutex<()>,
}

impl FileSessionRepository {
    /// A store that never touches the filesystem.
    pub fn in_memory(retention: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            codes: DashMap::new(),
            path: None,
            retention,
            flush_lock: Mutex::new(()),
        }
    }

    /// Opens (or starts) the store backed by `path`. Expired records in the
    /// file are dropped on load.
    pub async fn open(path: impl Into<PathBuf>, retention: Duration) -> Result<Self> {
        let path = path.into();
        let mut repo = Self::in_memory(retention);

        let stored: BTreeMap<Uuid, Session> = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::database("load_sessions", e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::database("load_sessions", e)),
        };

        let now = Utc::now();
        let total = stored.len();
        for (id, session) in stored {
            if repo.is_live(&session, now) {
                repo.codes.insert(session.code.clone(), id);
                repo.sessions.insert(id, session);
            }
        }
        info!(path = %path.display(), loaded = repo.sessions.len(), expired = total - repo.sessions.len(), "session file opened");

        repo.path = Some(path);
        Ok(repo)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of retained records, archived included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_live(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.created_at + self.retention > now
    }

    fn evict(&self, id: Uuid) {
        if let Some((_, session)) = self.sessions.remove(&id) {
            self.codes.remove_if(&session.code, |_, owner| *owner == id);
            debug!(session_id = %id, "expired session evicted");
        }
    }

    /// Live snapshot of a record, evicting it if it has expired.
    fn live(&self, id: Uuid) -> Option<Session> {
        let session = self.sessions.get(&id)?.value().clone();
        if self.is_live(&session, Utc::now()) {
            Some(session)
        } else {
            self.evict(id);
            None
        }
    }

    fn code_holder(&self, code: &str) -> Option<Uuid> {
        self.codes.get(code).map(|owner| *owner)
    }

    async fn flush(&self, operation: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.flush_lock.lock().await;
        let snapshot: BTreeMap<Uuid, Session> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::database(operation, e))?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await.map_err(|e| StoreError::database(operation, e))?;
        fs::rename(&tmp, path).await.map_err(|e| StoreError::database(operation, e))?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn insert(&self, session: &Session) -> Result<bool> {
        if let Some(holder) = self.code_holder(&session.code) {
            // Frees the code if its holder has expired.
            self.live(holder);
        }

        match self.codes.entry(session.code.clone()) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(session.id);
            }
        }
        self.sessions.insert(session.id, session.clone());

        self.flush("insert_session").await?;
        Ok(true)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.live(id))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Session>> {
        Ok(self.code_holder(code).and_then(|id| self.live(id)))
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        Ok(self.code_holder(code).and_then(|id| self.live(id)).is_some())
    }

    async fn replace(&self, session: &Session, expected_version: u64) -> Result<bool> {
        let now = Utc::now();
        let written = match self.sessions.get_mut(&session.id) {
            Some(mut stored)
                if !stored.is_archived && stored.version == expected_version && self.is_live(&stored, now) =>
            {
                stored.items = session.items.clone();
                stored.version = session.version;
                stored.last_modified = session.last_modified;
                true
            }
            _ => false,
        };

        if written {
            self.flush("replace_session").await?;
        }
        Ok(written)
    }

    async fn archive(&self, id: Uuid) -> Result<bool> {
        let now = Utc::now();
        let archived = match self.sessions.get_mut(&id) {
            Some(mut stored) if !stored.is_archived && self.is_live(&stored, now) => {
                stored.is_archived = true;
                stored.last_modified = now;
                true
            }
            _ => false,
        };

        if archived {
            self.flush("archive_session").await?;
        }
        Ok(archived)
    }
}
