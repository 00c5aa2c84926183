//! `PostgreSQL` implementation of the `SessionStore` trait.
//!
//! The revision compare-and-swap is expressed in SQL: an update only
//! lands when the stored revision still matches the caller's, and an
//! insert only lands when no row exists yet. A miss on either reports
//! the stored revision back as a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use tenfold_core::player::PlayerId;
use tenfold_session::{GameSession, SessionStore, SessionSummary, StoreError};

use crate::schema::CREATE_SESSIONS_TABLE;

/// PostgreSQL-backed session store.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new `PgSessionStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the sessions table and its index if absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` when the DDL fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(CREATE_SESSIONS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        tracing::info!("session schema ensured");
        Ok(())
    }

    async fn stored_revision(&self, player_id: &PlayerId) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT revision FROM game_sessions WHERE player_id = $1")
            .bind(player_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map_or(0, |row| row.get::<i64, _>("revision")))
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, player_id: &PlayerId) -> Result<Option<GameSession>, StoreError> {
        let row = sqlx::query("SELECT doc FROM game_sessions WHERE player_id = $1")
            .bind(player_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|row| {
            let doc: serde_json::Value = row.get("doc");
            serde_json::from_value(doc).map_err(|e| StoreError::Backend(e.to_string()))
        })
        .transpose()
    }

    async fn save(&self, session: &mut GameSession) -> Result<(), StoreError> {
        let expected = session.revision;
        session.revision += 1;
        let doc = serde_json::to_value(&*session)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let punishment = session
            .pending_punishment
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let rows_affected = if expected == 0 {
            sqlx::query(
                "INSERT INTO game_sessions
                   (player_id, doc, is_in_trial, opportunities_remaining,
                    daily_success_achieved, pending_punishment, last_modified, revision)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (player_id) DO NOTHING",
            )
            .bind(session.player_id.as_str())
            .bind(&doc)
            .bind(session.is_in_trial)
            .bind(session.opportunities_remaining)
            .bind(session.daily_success_achieved)
            .bind(&punishment)
            .bind(session.last_modified)
            .bind(session.revision)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected()
        } else {
            sqlx::query(
                "UPDATE game_sessions
                 SET doc = $2, is_in_trial = $3, opportunities_remaining = $4,
                     daily_success_achieved = $5, pending_punishment = $6,
                     last_modified = $7, revision = $8
                 WHERE player_id = $1 AND revision = $9",
            )
            .bind(session.player_id.as_str())
            .bind(&doc)
            .bind(session.is_in_trial)
            .bind(session.opportunities_remaining)
            .bind(session.daily_success_achieved)
            .bind(&punishment)
            .bind(session.last_modified)
            .bind(session.revision)
            .bind(expected)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected()
        };

        if rows_affected == 0 {
            session.revision = expected;
            let actual = self.stored_revision(&session.player_id).await?;
            return Err(StoreError::Conflict {
                player_id: session.player_id.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    async fn clear(&self, player_id: &PlayerId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM game_sessions WHERE player_id = $1")
            .bind(player_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        tracing::info!(player_id = %player_id, "session cleared");
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT player_id, last_modified, is_in_trial, opportunities_remaining,
                    daily_success_achieved, pending_punishment
             FROM game_sessions
             ORDER BY last_modified DESC
             LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let pending: Option<serde_json::Value> = row.get("pending_punishment");
                let pending_punishment = pending
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(SessionSummary {
                    player_id: PlayerId::new(row.get::<String, _>("player_id")),
                    last_modified: row.get::<DateTime<Utc>, _>("last_modified"),
                    is_in_trial: row.get("is_in_trial"),
                    opportunities_remaining: row.get("opportunities_remaining"),
                    daily_success_achieved: row.get("daily_success_achieved"),
                    pending_punishment,
                })
            })
            .collect()
    }
}
