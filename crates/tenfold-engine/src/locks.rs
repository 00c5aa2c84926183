//! Per-player session locks.
//!
//! A shared map of per-entry `tokio::sync::Mutex`es: sessions for distinct
//! players proceed fully in parallel while turns for one player are
//! strictly serialized. `try_acquire` is the fail-fast path behind
//! `SessionBusy`; nothing ever queues on a busy session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use tenfold_core::player::PlayerId;

/// Guard for one player's turn; the session may only be mutated while one
/// of these is held.
pub type SessionGuard = OwnedMutexGuard<()>;

/// Concurrent map of per-player locks, created on first use.
#[derive(Debug, Default)]
pub struct SessionLocks {
    entries: StdMutex<HashMap<PlayerId, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, player_id: &PlayerId) -> Arc<AsyncMutex<()>> {
        let mut entries = self.entries.lock().expect("lock map poisoned");
        entries
            .entry(player_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquires the player's lock without waiting, or `None` if a turn is
    /// already in flight.
    #[must_use]
    pub fn try_acquire(&self, player_id: &PlayerId) -> Option<SessionGuard> {
        self.entry(player_id).try_lock_owned().ok()
    }

    /// Waits for the player's lock. Used by short scoped writes (verdict
    /// delivery, admin operations), never by turns.
    pub async fn acquire(&self, player_id: &PlayerId) -> SessionGuard {
        self.entry(player_id).lock_owned().await
    }

    /// Whether a turn currently holds the player's lock. Racy by nature;
    /// only used to detect a stale `is_processing` flag after a crash.
    #[must_use]
    pub fn is_locked(&self, player_id: &PlayerId) -> bool {
        let entries = self.entries.lock().expect("lock map poisoned");
        entries
            .get(player_id)
            .is_some_and(|entry| entry.try_lock().is_err())
    }
}
