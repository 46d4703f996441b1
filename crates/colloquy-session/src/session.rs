//! Per-session state and the handles that expose it.

use chrono::{DateTime, Utc};
use colloquy_core::{ColloquyError, ColloquyResult, SessionId, Transcript};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

/// One conversation: a transcript plus the slot that serializes request
/// cycles on it.
pub(crate) struct Session {
    pub(crate) id: SessionId,
    pub(crate) transcript: RwLock<Transcript>,
    slot: Arc<Semaphore>,
    created_at: DateTime<Utc>,
    last_active: Mutex<Instant>,
    removed: AtomicBool,
}

impl Session {
    pub(crate) fn new(id: SessionId, transcript: Transcript) -> Self {
        Self {
            id,
            transcript: RwLock::new(transcript),
            slot: Arc::new(Semaphore::new(1)),
            created_at: Utc::now(),
            last_active: Mutex::new(Instant::now()),
            removed: AtomicBool::new(false),
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_active.lock().elapsed()
    }

    /// True while a request cycle holds the exclusion slot.
    pub(crate) fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Waits for any in-flight cycle, then takes the slot for good.
    pub(crate) async fn drain_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.slot.clone().acquire_owned().await.ok()
    }

    /// Fails later appends and wakes every slot waiter with an error.
    /// Must be called with the transcript write lock held.
    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
        self.slot.close();
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

/// A cheap, clonable reference to one session's transcript.
///
/// Handles only read. Appends go through [`SessionStore`](crate::SessionStore)
/// so that the journal and the in-memory transcript stay in step.
#[derive(Clone)]
pub struct TranscriptHandle {
    pub(crate) session: Arc<Session>,
}

impl TranscriptHandle {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Key of the session this handle is bound to.
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// When the session was first materialised in this process.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.session.created_at
    }

    /// Point-in-time copy of the transcript.
    pub async fn snapshot(&self) -> Transcript {
        self.session.transcript.read().await.clone()
    }

    /// Current number of turns.
    pub async fn len(&self) -> usize {
        self.session.transcript.read().await.len()
    }

    /// Whether the transcript has no turns yet.
    pub async fn is_empty(&self) -> bool {
        self.session.transcript.read().await.is_empty()
    }

    /// Whether both handles point at the same underlying transcript.
    pub fn same_session(&self, other: &TranscriptHandle) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }

    /// Waits for this session's exclusion slot.
    ///
    /// Waiters are served in FIFO order. The slot is released when the
    /// returned guard is dropped, including when the owning future is
    /// cancelled or panics.
    pub async fn acquire_slot(&self) -> ColloquyResult<SessionSlot> {
        let permit = self
            .session
            .slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| {
                ColloquyError::Session(format!("session {} was removed", self.session.id))
            })?;
        Ok(SessionSlot {
            session_id: self.session.id.clone(),
            _permit: permit,
        })
    }

    /// Takes the exclusion slot only if nobody holds it.
    pub fn try_acquire_slot(&self) -> Option<SessionSlot> {
        let permit = self.session.slot.clone().try_acquire_owned().ok()?;
        Some(SessionSlot {
            session_id: self.session.id.clone(),
            _permit: permit,
        })
    }
}

impl std::fmt::Debug for TranscriptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptHandle")
            .field("session_id", &self.session.id)
            .finish_non_exhaustive()
    }
}

/// Guard proving exclusive ownership of a session's request cycle.
#[must_use = "the exclusion slot is released as soon as the guard is dropped"]
pub struct SessionSlot {
    session_id: SessionId,
    _permit: OwnedSemaphorePermit,
}

impl SessionSlot {
    /// Session this slot belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

impl std::fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSlot")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn handle(id: &str) -> TranscriptHandle {
        let id = SessionId::parse(id).unwrap();
        TranscriptHandle::new(Arc::new(Session::new(id, Transcript::new())))
    }

    #[tokio::test]
    async fn sequential_slot_access() {
        let h = handle("s1");

        let slot1 = h.acquire_slot().await.unwrap();
        drop(slot1);

        let slot2 = h.acquire_slot().await.unwrap();
        assert_eq!(slot2.session_id().as_str(), "s1");
    }

    #[tokio::test]
    async fn slot_is_exclusive() {
        let h = handle("s1");
        let slot = h.acquire_slot().await.unwrap();
        assert!(h.session.is_busy());
        assert!(h.try_acquire_slot().is_none());
        drop(slot);
        assert!(!h.session.is_busy());
        assert!(h.try_acquire_slot().is_some());
    }

    #[tokio::test]
    async fn same_session_waits_for_release() {
        let h = handle("s1");
        let h2 = h.clone();

        let slot = h.acquire_slot().await.unwrap();

        let waiter = tokio::spawn(async move {
            let _slot = h2.acquire_slot().await.unwrap();
            42
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(slot);
        assert_eq!(waiter.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_wedge_slot() {
        let h = handle("s1");
        let h2 = h.clone();

        let slot = h.acquire_slot().await.unwrap();
        let waiter = tokio::spawn(async move {
            let _slot = h2.acquire_slot().await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;
        drop(slot);

        assert!(h.try_acquire_slot().is_some());
    }
}
