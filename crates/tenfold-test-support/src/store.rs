//! Failing and flaky `SessionStore` implementations for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use tenfold_core::player::PlayerId;
use tenfold_session::{GameSession, InMemorySessionStore, SessionStore, SessionSummary, StoreError};

/// A store whose every operation fails. Useful for testing error paths.
#[derive(Debug, Default)]
pub struct FailingSessionStore;

#[async_trait]
impl SessionStore for FailingSessionStore {
    async fn load(&self, _player_id: &PlayerId) -> Result<Option<GameSession>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn save(&self, _session: &mut GameSession) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn clear(&self, _player_id: &PlayerId) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
}

/// A store that fails the first `n` saves, then behaves like the in-memory
/// store. Exercises the orchestrator's bounded persistence retries.
#[derive(Debug, Default)]
pub struct FlakySessionStore {
    inner: InMemorySessionStore,
    failures_remaining: AtomicU32,
    save_attempts: AtomicU32,
}

impl FlakySessionStore {
    #[must_use]
    pub fn failing_saves(n: u32) -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            failures_remaining: AtomicU32::new(n),
            save_attempts: AtomicU32::new(0),
        }
    }

    /// Total `save` calls observed, failed ones included.
    #[must_use]
    pub fn save_attempts(&self) -> u32 {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn load(&self, player_id: &PlayerId) -> Result<Option<GameSession>, StoreError> {
        self.inner.load(player_id).await
    }

    async fn save(&self, session: &mut GameSession) -> Result<(), StoreError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Backend("write failed".into()));
        }
        self.inner.save(session).await
    }

    async fn clear(&self, player_id: &PlayerId) -> Result<(), StoreError> {
        self.inner.clear(player_id).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        self.inner.recent(limit).await
    }
}
