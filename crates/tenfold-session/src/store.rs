//! Session store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use tenfold_core::player::PlayerId;

use crate::model::{GameSession, Punishment};

/// Errors surfaced by a session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored revision differs from the caller's; another writer got
    /// there first (lost-update detection).
    #[error("revision conflict for {player_id}: expected {expected}, found {actual}")]
    Conflict {
        player_id: PlayerId,
        expected: i64,
        actual: i64,
    },

    /// A backend failure (I/O, connection, serialization).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Light listing row for the admin surface and staleness queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub player_id: PlayerId,
    pub last_modified: DateTime<Utc>,
    pub is_in_trial: bool,
    pub opportunities_remaining: i32,
    pub daily_success_achieved: bool,
    pub pending_punishment: Option<Punishment>,
}

impl From<&GameSession> for SessionSummary {
    fn from(session: &GameSession) -> Self {
        Self {
            player_id: session.player_id.clone(),
            last_modified: session.last_modified,
            is_in_trial: session.is_in_trial,
            opportunities_remaining: session.opportunities_remaining,
            daily_success_achieved: session.daily_success_achieved,
            pending_punishment: session.pending_punishment.clone(),
        }
    }
}

/// Durable mapping from player identity to `GameSession`.
///
/// `save` implements compare-and-swap on the session's `revision` counter:
/// the write succeeds only if the stored revision still matches the
/// caller's, and bumps the counter on success (both in the store and on the
/// caller's value). A fresh session carries revision 0 and is inserted.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the session for a player, or `None` if never created.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on backend failure.
    async fn load(&self, player_id: &PlayerId) -> Result<Option<GameSession>, StoreError>;

    /// Writes the session through, enforcing the revision CAS.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` on a lost update and
    /// `StoreError::Backend` on backend failure.
    async fn save(&self, session: &mut GameSession) -> Result<(), StoreError>;

    /// Resets a player's session to nothing; the next contact recreates it
    /// with defaults.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on backend failure.
    async fn clear(&self, player_id: &PlayerId) -> Result<(), StoreError>;

    /// The most recently modified sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on backend failure.
    async fn recent(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError>;
}
