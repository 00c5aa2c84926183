//! Session store database schema.

/// SQL to create the sessions table. The full record lives in `doc`; the
/// listing columns are denormalized copies so the admin surface never
/// deserializes whole sessions.
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS game_sessions (
    player_id               TEXT PRIMARY KEY,
    doc                     JSONB NOT NULL,
    is_in_trial             BOOLEAN NOT NULL,
    opportunities_remaining INTEGER NOT NULL,
    daily_success_achieved  BOOLEAN NOT NULL,
    pending_punishment      JSONB,
    last_modified           TIMESTAMPTZ NOT NULL,
    revision                BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_game_sessions_last_modified
    ON game_sessions (last_modified DESC);
";
