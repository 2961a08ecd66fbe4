//! Process-wide registry of live sessions and their directories.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    persist,
    state::{SessionContext, SessionId, SessionState},
};
use crate::internal::ai::error::{ChatError, ChatResult};

/// Shared handle to one session. Holding its lock is the per-session
/// mutual-exclusion scope for mutating operations.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Locked session, held for the duration of one mutating operation.
pub type SessionGuard = OwnedMutexGuard<SessionState>;

/// Registry mapping session ids to in-memory records.
///
/// Each session owns `{root}/{id}/`. Ids come from a monotonic counter and are
/// never reused within the process, even after sessions are removed.
pub struct SessionStore {
    root: PathBuf,
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionStore {
    /// Create an empty store rooted at `root` (usually `./chats`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by session `id`.
    pub fn session_dir(&self, id: SessionId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Return a fresh id.
    pub fn allocate_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Make sure future ids are greater than `id`.
    fn reserve(&self, id: SessionId) {
        self.next_id
            .fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }

    /// Insert a new session, create its directory, and persist it.
    ///
    /// If the save fails the session is removed again.
    pub async fn create(&self, id: SessionId, context: SessionContext) -> ChatResult<()> {
        let guard = self.insert(id, context)?;
        let dir = self.session_dir(id);
        if let Err(err) = persist::save(&dir, &guard.context).await {
            self.delete(id);
            return Err(err);
        }
        Ok(())
    }

    /// Register a record that is already on disk (import and recovery).
    pub fn register(&self, id: SessionId, context: SessionContext) -> ChatResult<()> {
        self.insert(id, context).map(drop)
    }

    /// Insert and return the new record already locked, so nobody observes
    /// it before the caller is done with it.
    fn insert(&self, id: SessionId, context: SessionContext) -> ChatResult<SessionGuard> {
        let handle: SessionHandle = Arc::new(Mutex::new(SessionState::new(id, context)));
        let guard = handle
            .clone()
            .try_lock_owned()
            .map_err(|_| ChatError::AlreadyExists(id))?;

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(&id) {
            return Err(ChatError::AlreadyExists(id));
        }
        sessions.insert(id, handle);
        drop(sessions);

        self.reserve(id);
        Ok(guard)
    }

    pub fn get(&self, id: SessionId) -> ChatResult<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatError::session_not_found(id))
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// Acquire the per-session lock, waiting for any in-flight operation.
    pub async fn lock(&self, id: SessionId) -> ChatResult<SessionGuard> {
        let guard = self.get(id)?.lock_owned().await;
        if guard.retired {
            return Err(ChatError::session_not_found(id));
        }
        Ok(guard)
    }

    /// Clone of the session's current context.
    pub async fn snapshot(&self, id: SessionId) -> ChatResult<SessionContext> {
        Ok(self.lock(id).await?.context.clone())
    }

    /// Apply `f` to a copy of the context under the session lock, persist the
    /// copy, then make it current.
    ///
    /// If `f` or the save fails the session is left exactly as it was.
    pub async fn mutate<R, F>(&self, id: SessionId, f: F) -> ChatResult<R>
    where
        F: FnOnce(&mut SessionContext) -> ChatResult<R>,
    {
        let mut guard = self.lock(id).await?;
        let mut pending = guard.context.clone();
        let result = f(&mut pending)?;
        self.commit(&mut guard, pending).await?;
        Ok(result)
    }

    /// Persist `context` for a locked session and only then install it.
    pub async fn commit(
        &self,
        guard: &mut SessionGuard,
        context: SessionContext,
    ) -> ChatResult<()> {
        persist::save(&self.session_dir(guard.id), &context).await?;
        guard.context = context;
        Ok(())
    }

    /// Remove a session from memory only. The directory is left for the caller.
    pub fn delete(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    /// Read `{root}/{id}/context.json` and register it under `id`.
    pub async fn load(&self, id: SessionId) -> ChatResult<()> {
        let context = persist::read(&self.session_dir(id)).await?;
        self.register(id, context)
    }

    /// Ids of all live sessions, ascending.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-register every session directory found under the root.
    ///
    /// Directories whose name is not an id or whose document cannot be read
    /// are skipped with a warning. Returns the number of sessions loaded.
    pub async fn recover(&self) -> ChatResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut loaded = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<SessionId>().ok())
            else {
                continue;
            };
            // Never hand this id out again, even if the directory is corrupt.
            self.reserve(id);

            match self.load(id).await {
                Ok(()) => loaded += 1,
                Err(e) => {
                    tracing::warn!(
                        session_id = id,
                        error = %e,
                        "skipping unreadable session directory"
                    );
                }
            }
        }
        Ok(loaded)
    }
}
