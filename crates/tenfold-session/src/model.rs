//! The per-player session record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tenfold_core::chat::{ChatMessage, Role};
use tenfold_core::player::PlayerId;
use tenfold_core::verdict::Verdict;

/// Daily quota of trial opportunities.
pub const DAILY_OPPORTUNITIES: i32 = 10;

/// A punishment verdict queued against a session, applied lazily at the
/// start of the player's next turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punishment {
    pub level: tenfold_core::verdict::AbuseLevel,
    pub reason: String,
    /// Set exactly once, at the turn immediately following the verdict.
    pub applied: bool,
}

impl From<Verdict> for Punishment {
    fn from(verdict: Verdict) -> Self {
        Self {
            level: verdict.level,
            reason: verdict.reason,
            applied: false,
        }
    }
}

/// Durable per-player game state. Exactly one exists per player identity;
/// it is mutated exclusively by the turn orchestrator under the session
/// lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub player_id: PlayerId,
    /// Calendar day this session belongs to; a later day starts fresh.
    pub session_date: NaiveDate,
    pub opportunities_remaining: i32,
    /// Open-ended document describing the character's present narrative
    /// state. `None` outside a trial.
    pub current_life: Option<serde_json::Value>,
    /// Ordered narrative entries shown to the player.
    pub display_history: Vec<String>,
    /// Model-facing transcript used for prompt context. Never crosses the
    /// client boundary.
    pub history: Vec<ChatMessage>,
    pub is_in_trial: bool,
    /// Persisted mirror of the per-session lock.
    pub is_processing: bool,
    pub daily_success_achieved: bool,
    pub pending_punishment: Option<Punishment>,
    /// Turns since the last batched abuse sweep.
    pub unchecked_turns: u32,
    pub last_modified: DateTime<Utc>,
    /// Monotonic counter backing the store's compare-and-swap.
    pub revision: i64,
}

impl GameSession {
    /// Creates a fresh daily session with the default quota, seeded with
    /// the game-master system prompt and the welcome banner.
    #[must_use]
    pub fn fresh(
        player_id: PlayerId,
        session_date: NaiveDate,
        now: DateTime<Utc>,
        system_prompt: &str,
        welcome: &str,
    ) -> Self {
        Self {
            player_id,
            session_date,
            opportunities_remaining: DAILY_OPPORTUNITIES,
            current_life: None,
            display_history: vec![welcome.to_owned()],
            history: vec![ChatMessage::system(system_prompt)],
            is_in_trial: false,
            is_processing: false,
            daily_success_achieved: false,
            pending_punishment: None,
            unchecked_turns: 0,
            last_modified: now,
            revision: 0,
        }
    }

    /// Records a new punishment verdict. An unapplied punishment is
    /// overwritten only if the new verdict is not lower severity.
    pub fn queue_punishment(&mut self, verdict: Verdict) {
        match &self.pending_punishment {
            Some(existing) if !existing.applied && verdict.level < existing.level => {}
            _ => self.pending_punishment = Some(verdict.into()),
        }
    }

    /// The last `n` player inputs from the model transcript, oldest first.
    /// Fed to the batched abuse sweep.
    #[must_use]
    pub fn recent_player_inputs(&self, n: usize) -> Vec<&str> {
        let inputs: Vec<&str> = self
            .history
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        let skip = inputs.len().saturating_sub(n);
        inputs[skip..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenfold_core::verdict::AbuseLevel;

    fn session() -> GameSession {
        GameSession::fresh(
            PlayerId::new("aria"),
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            Utc::now(),
            "you are the game master",
            "welcome",
        )
    }

    fn verdict(level: AbuseLevel) -> Verdict {
        Verdict { level, reason: "test".into() }
    }

    #[test]
    fn test_fresh_session_has_default_quota() {
        let s = session();
        assert_eq!(s.opportunities_remaining, DAILY_OPPORTUNITIES);
        assert!(!s.is_in_trial);
        assert!(!s.daily_success_achieved);
        assert_eq!(s.revision, 0);
        assert_eq!(s.display_history, vec!["welcome".to_owned()]);
    }

    #[test]
    fn test_queue_punishment_keeps_higher_pending_severity() {
        let mut s = session();
        s.queue_punishment(verdict(AbuseLevel::Block));
        s.queue_punishment(verdict(AbuseLevel::Warning));
        assert_eq!(s.pending_punishment.as_ref().unwrap().level, AbuseLevel::Block);
    }

    #[test]
    fn test_queue_punishment_upgrades_pending_severity() {
        let mut s = session();
        s.queue_punishment(verdict(AbuseLevel::Warning));
        s.queue_punishment(verdict(AbuseLevel::Restrict));
        assert_eq!(
            s.pending_punishment.as_ref().unwrap().level,
            AbuseLevel::Restrict
        );
    }

    #[test]
    fn test_queue_punishment_replaces_applied_punishment() {
        let mut s = session();
        s.queue_punishment(verdict(AbuseLevel::Block));
        s.pending_punishment.as_mut().unwrap().applied = true;
        s.queue_punishment(verdict(AbuseLevel::Warning));
        let pending = s.pending_punishment.as_ref().unwrap();
        assert_eq!(pending.level, AbuseLevel::Warning);
        assert!(!pending.applied);
    }

    #[test]
    fn test_recent_player_inputs_returns_newest_user_entries() {
        let mut s = session();
        for i in 0..5 {
            s.history.push(ChatMessage::user(format!("action {i}")));
            s.history.push(ChatMessage::assistant("reply"));
        }
        assert_eq!(s.recent_player_inputs(2), vec!["action 3", "action 4"]);
    }
}
