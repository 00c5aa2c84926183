//! In-memory session store.
//!
//! Backs tests and single-process deployments without a database. The
//! revision CAS is enforced the same way the SQL store enforces it, so the
//! orchestrator's retry paths behave identically against either.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use tenfold_core::player::PlayerId;

use crate::model::GameSession;
use crate::store::{SessionStore, SessionSummary, StoreError};

/// Session store holding everything in a process-local map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<PlayerId, GameSession>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, player_id: &PlayerId) -> Result<Option<GameSession>, StoreError> {
        Ok(self.sessions.read().await.get(player_id).cloned())
    }

    async fn save(&self, session: &mut GameSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(stored) = sessions.get(&session.player_id) {
            if stored.revision != session.revision {
                return Err(StoreError::Conflict {
                    player_id: session.player_id.clone(),
                    expected: session.revision,
                    actual: stored.revision,
                });
            }
        }
        session.revision += 1;
        sessions.insert(session.player_id.clone(), session.clone());
        Ok(())
    }

    async fn clear(&self, player_id: &PlayerId) -> Result<(), StoreError> {
        if self.sessions.write().await.remove(player_id).is_some() {
            tracing::info!(player_id = %player_id, "session cleared");
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> =
            sessions.values().map(SessionSummary::from).collect();
        summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        summaries.truncate(limit);
        Ok(summaries)
    }
}
