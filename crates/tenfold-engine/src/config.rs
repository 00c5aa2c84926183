//! Engine tuning and built-in narrative framing.

use std::time::Duration;

use tenfold_judgment::JudgmentConfig;

/// Actions that start a trial. Matched case-insensitively after trimming.
pub const START_TRIAL_ACTIONS: &[&str] = &["start trial", "begin trial", "start next trial"];

/// Fallback game-master instructions; deployments override them through
/// configuration. The response contract is a JSON object carrying
/// `narrative` plus either `state_update` or `roll_request`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the game master of a turn-based narrative \
game. Each day the player receives ten trial opportunities; each trial weaves a new random \
life for them. Respond with a single JSON object containing `narrative` (the story text) and \
either `state_update` (dotted-path deltas to the game state) or `roll_request` ({type, \
target, sides}) when an uncertain action demands a judgment. When the character dies, say so \
in the narrative and set `is_in_trial` to false and `current_life` to null in `state_update`. \
When the player withdraws from the world with their gains, include `trigger` \
{\"name\": \"ascension\"} in `state_update`.";

/// Banner shown at the top of every fresh daily session.
pub const DEFAULT_WELCOME: &str = "# Tenfold Dreams\n\nEach day grants you ten chances to \
enter the dream. Every trial weaves a new life at random; at any crossing you may withdraw \
with what you hold, and the day's trials end there. Lives lost return nothing. Say \"start \
trial\" to begin.";

/// Appended when an ascension trigger ends the day successfully.
pub const ASCENSION_MESSAGE: &str = "[Echo of the Way]\nYour trial is complete; what you \
carried out of the dream settles into you. The gate stands closed until tomorrow.";

/// Appended when a `warning` punishment is applied.
pub const WARNING_NOTICE: &str = "[A Tremor in the Weave]\nA distant sigh crosses the dream. \
Your words strayed toward the loom itself. Mind your place within the story, and walk on.";

/// Appended when a `restrict` punishment is applied.
pub const RESTRICT_NOTICE: &str = "[The Thread Is Cut]\nThe world around you fades to \
unwoven gray. This life is struck from the record; its gains are forfeit. Your current trial \
has ended. Spend your next chance with a steadier heart.";

/// Appended when a `block` punishment is applied.
pub const BLOCK_NOTICE: &str = "[Cast Out of the Dream]\nThe gate slams shut before you. For \
conduct that tears at the weave itself, today's remaining chances are revoked. The dream \
will consider you again tomorrow.";

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// System prompt seeded into every fresh session transcript.
    pub system_prompt: String,
    /// Banner entry opening a fresh session's display history.
    pub welcome_banner: String,
    /// Character budget for prompt context; oldest entries trimmed first.
    pub history_budget: usize,
    /// Bounded persistence retries per turn.
    pub save_attempts: u32,
    /// Delay before the first persistence retry; doubles per attempt.
    pub save_backoff: Duration,
    pub judgment: JudgmentConfig,
    /// Turns between widened abuse sweeps.
    pub sweep_interval: u32,
    /// Base number of recent inputs fed to a widened sweep.
    pub sweep_window: usize,
    /// Provider preference handed to the gateway, if any.
    pub provider_preference: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            welcome_banner: DEFAULT_WELCOME.to_owned(),
            history_budget: 100_000,
            save_attempts: 3,
            save_backoff: Duration::from_millis(100),
            judgment: JudgmentConfig::default(),
            sweep_interval: 5,
            sweep_window: 8,
            provider_preference: None,
        }
    }
}

/// Whether the action asks to start a trial.
#[must_use]
pub fn is_start_trial(action: &str) -> bool {
    let normalized = action.trim().to_ascii_lowercase();
    START_TRIAL_ACTIONS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_trial_matching_ignores_case_and_whitespace() {
        assert!(is_start_trial("Start Trial"));
        assert!(is_start_trial("  begin trial \n"));
        assert!(!is_start_trial("start trouble"));
        assert!(!is_start_trial("I start the trial of my enemy"));
    }
}
