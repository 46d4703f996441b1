//! The session registry.

use crate::journal::TranscriptJournal;
use crate::session::{Session, TranscriptHandle};
use colloquy_core::{ColloquyError, ColloquyResult, SessionId, Transcript, Turn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Concurrency-safe registry of session transcripts.
///
/// The registry map is guarded by a short-lived lock that is never held
/// across an await. Each session carries its own transcript lock, so appends
/// on different sessions proceed in parallel.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    journal: Option<Arc<dyn TranscriptJournal>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// In-memory store. Transcripts live for the lifetime of the process.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            journal: None,
        }
    }

    /// Store whose appends are written through to `journal` before they
    /// become visible. Sessions unknown in memory are reloaded from the
    /// journal on first reference.
    pub fn with_journal(journal: Arc<dyn TranscriptJournal>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            journal: Some(journal),
        }
    }

    /// Journaled store with every session on disk loaded up front.
    pub async fn restore(journal: Arc<dyn TranscriptJournal>) -> ColloquyResult<Self> {
        let ids = journal.list().await?;
        let mut sessions = HashMap::with_capacity(ids.len());
        for id in ids {
            let transcript = Transcript::from(journal.load(&id).await?);
            sessions.insert(id.clone(), Arc::new(Session::new(id, transcript)));
        }
        info!(sessions = sessions.len(), "Restored sessions from journal");
        Ok(Self {
            sessions: RwLock::new(sessions),
            journal: Some(journal),
        })
    }

    /// Returns a handle bound to the session's transcript, creating an
    /// empty one for unseen ids.
    ///
    /// Two calls with the same id always yield handles to the same
    /// transcript, even when they race.
    pub async fn get_or_create(&self, session_id: &str) -> ColloquyResult<TranscriptHandle> {
        let id = SessionId::parse(session_id)?;
        if let Some(handle) = self.resident(&id) {
            return Ok(handle);
        }
        let restored = self.load_journaled(&id).await?;
        Ok(self.insert(id, restored))
    }

    /// Like [`get_or_create`](Self::get_or_create) but never creates an
    /// empty session. Journaled sessions with recorded turns are loaded.
    pub async fn get(&self, session_id: &str) -> ColloquyResult<Option<TranscriptHandle>> {
        let id = SessionId::parse(session_id)?;
        if let Some(handle) = self.resident(&id) {
            return Ok(Some(handle));
        }
        let restored = self.load_journaled(&id).await?;
        if restored.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.insert(id, restored)))
    }

    fn resident(&self, id: &SessionId) -> Option<TranscriptHandle> {
        self.sessions.read().get(id).cloned().map(TranscriptHandle::new)
    }

    async fn load_journaled(&self, id: &SessionId) -> ColloquyResult<Transcript> {
        match &self.journal {
            Some(journal) => Ok(Transcript::from(journal.load(id).await?)),
            None => Ok(Transcript::new()),
        }
    }

    /// Inserts unless another caller won the race, in which case the
    /// resident session is returned and `restored` is discarded.
    fn insert(&self, id: SessionId, restored: Transcript) -> TranscriptHandle {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(id)
            .or_insert_with_key(|id| {
                if restored.is_empty() {
                    debug!(session_id = %id, "Created session");
                } else {
                    info!(session_id = %id, turns = restored.len(), "Restored session from journal");
                }
                Arc::new(Session::new(id.clone(), restored))
            })
            .clone();
        TranscriptHandle::new(session)
    }

    /// Appends `turn` to the session's transcript, creating the session if
    /// needed. All-or-nothing: readers see either the old transcript or the
    /// one ending in `turn`.
    pub async fn append_turn(&self, session_id: &str, turn: Turn) -> ColloquyResult<()> {
        let handle = self.get_or_create(session_id).await?;
        self.append_to(&handle, turn).await
    }

    /// Appends through an existing handle, skipping the registry lookup.
    pub async fn append_to(&self, handle: &TranscriptHandle, turn: Turn) -> ColloquyResult<()> {
        let session = &handle.session;
        let mut transcript = session.transcript.write().await;
        if session.is_removed() {
            return Err(ColloquyError::Session(format!("session {} was removed", session.id)));
        }
        if let Some(journal) = &self.journal {
            journal.append(&session.id, &turn).await?;
        }
        transcript.push(turn);
        session.touch();
        debug!(session_id = %session.id, turns = transcript.len(), "Appended turn");
        Ok(())
    }

    /// Point-in-time copy of the session's transcript.
    ///
    /// Unknown (but well-formed) ids yield an empty transcript without
    /// creating a session.
    pub async fn read_transcript(&self, session_id: &str) -> ColloquyResult<Transcript> {
        let id = SessionId::parse(session_id)?;
        let resident = self.sessions.read().get(&id).cloned();
        match resident {
            Some(session) => Ok(session.transcript.read().await.clone()),
            None => match &self.journal {
                Some(journal) => Ok(Transcript::from(journal.load(&id).await?)),
                None => Ok(Transcript::new()),
            },
        }
    }

    /// Whether a session with this id is resident in memory.
    pub fn contains(&self, session_id: &str) -> bool {
        SessionId::parse(session_id)
            .map(|id| self.sessions.read().contains_key(&id))
            .unwrap_or(false)
    }

    /// Ids of every resident session, in no particular order.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Number of resident sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Explicitly destroys a session, including its journal.
    ///
    /// Waits for an in-flight request cycle on the session to finish first.
    /// Requests already queued on the removed session fail, and appends
    /// through handles taken before removal fail without touching the
    /// journal. The next reference to the id starts a fresh session.
    ///
    /// Returns whether the session was resident.
    pub async fn remove(&self, session_id: &str) -> ColloquyResult<bool> {
        let id = SessionId::parse(session_id)?;
        let resident = self.sessions.read().get(&id).cloned();

        let Some(session) = resident else {
            if let Some(journal) = &self.journal {
                journal.remove(&id).await?;
            }
            return Ok(false);
        };

        // Holding the slot keeps new cycles queued on this session rather
        // than on a replacement created mid-removal.
        let _slot = session.drain_slot().await;
        {
            let _transcript = session.transcript.write().await;
            if session.is_removed() {
                return Ok(false);
            }
            session.mark_removed();
            if let Some(journal) = &self.journal {
                journal.remove(&id).await?;
            }
        }

        let mut sessions = self.sessions.write();
        if sessions
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, &session))
        {
            sessions.remove(&id);
        }
        drop(sessions);

        info!(session_id = %id, "Removed session");
        Ok(true)
    }

    /// Evicts sessions idle for at least `max_idle` that nobody references.
    ///
    /// Journaled transcripts are only dropped from memory and come back on
    /// the next reference. Returns the number of evicted sessions.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| {
            Arc::strong_count(session) > 1 || session.is_busy() || session.idle_for() < max_idle
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Pruned idle sessions");
        }
        evicted
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use colloquy_core::{ColloquyError, Role};

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = SessionStore::new();
        let a = store.get_or_create("s1").await.unwrap();
        let b = store.get_or_create("s1").await.unwrap();
        assert!(a.same_session(&b));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn get_or_create_rejects_bad_ids() {
        let store = SessionStore::new();
        assert!(matches!(
            store.get_or_create("").await,
            Err(ColloquyError::InvalidSessionId(_))
        ));
        assert!(matches!(
            store.get_or_create("bad id").await,
            Err(ColloquyError::InvalidSessionId(_))
        ));
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn append_and_read() {
        let store = SessionStore::new();
        store
            .append_turn("s1", Turn::user("Hello", vec![]))
            .await
            .unwrap();
        store
            .append_turn("s1", Turn::assistant("Hi there"))
            .await
            .unwrap();

        let transcript = store.read_transcript("s1").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[0].role(), Role::User);
        assert_eq!(transcript.turns()[1].content(), "Hi there");
    }

    #[tokio::test]
    async fn snapshot_is_detached() {
        let store = SessionStore::new();
        store.append_turn("s1", Turn::user("one", vec![])).await.unwrap();
        let snapshot = store.read_transcript("s1").await.unwrap();
        store.append_turn("s1", Turn::assistant("two")).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.read_transcript("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn read_unknown_session_is_empty_and_not_created() {
        let store = SessionStore::new();
        let transcript = store.read_transcript("ghost").await.unwrap();
        assert!(transcript.is_empty());
        assert!(!store.contains("ghost"));
    }

    #[tokio::test]
    async fn remove_session() {
        let store = SessionStore::new();
        store.append_turn("s1", Turn::user("x", vec![])).await.unwrap();
        assert!(store.remove("s1").await.unwrap());
        assert!(!store.remove("s1").await.unwrap());
        assert!(store.read_transcript("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_does_not_create() {
        let store = SessionStore::new();
        assert!(store.get("ghost").await.unwrap().is_none());
        assert_eq!(store.session_count(), 0);

        let created = store.get_or_create("s1").await.unwrap();
        let found = store.get("s1").await.unwrap().unwrap();
        assert!(found.same_session(&created));
    }

    #[tokio::test]
    async fn stale_handle_cannot_append_after_remove() {
        let store = SessionStore::new();
        let stale = store.get_or_create("s1").await.unwrap();
        store.append_to(&stale, Turn::user("old", vec![])).await.unwrap();

        assert!(store.remove("s1").await.unwrap());
        assert!(matches!(
            store.append_to(&stale, Turn::assistant("late")).await,
            Err(ColloquyError::Session(_))
        ));
        assert!(stale.acquire_slot().await.is_err());

        let fresh = store.get_or_create("s1").await.unwrap();
        assert!(!fresh.same_session(&stale));
        assert!(fresh.is_empty().await);
    }

    #[tokio::test]
    async fn remove_waits_for_slot_holder() {
        let store = Arc::new(SessionStore::new());
        let handle = store.get_or_create("s1").await.unwrap();
        let slot = handle.acquire_slot().await.unwrap();

        let removal = {
            let store = store.clone();
            tokio::spawn(async move { store.remove("s1").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!removal.is_finished());
        assert!(store.contains("s1"));

        drop(slot);
        assert!(removal.await.unwrap().unwrap());
        assert!(!store.contains("s1"));
    }

    #[tokio::test]
    async fn prune_idle_skips_referenced_sessions() {
        let store = SessionStore::new();
        let held = store.get_or_create("held").await.unwrap();
        store.get_or_create("idle").await.unwrap();

        let evicted = store.prune_idle(Duration::ZERO);
        assert_eq!(evicted, 1);
        assert!(store.contains("held"));
        assert!(!store.contains("idle"));
        drop(held);
    }

    #[tokio::test]
    async fn prune_idle_keeps_recent_sessions() {
        let store = SessionStore::new();
        store.get_or_create("fresh").await.unwrap();
        assert_eq!(store.prune_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.session_count(), 1);
    }
}
