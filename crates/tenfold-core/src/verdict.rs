//! Anti-abuse verdict types.

use serde::{Deserialize, Serialize};

/// Severity of an anti-abuse verdict, ordered least to most severe.
/// The absence of a verdict means the input is clear.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AbuseLevel {
    Warning,
    Restrict,
    Block,
}

/// A determination produced by the anti-abuse analyzer, queued against the
/// session and applied at the start of the player's next turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub level: AbuseLevel,
    /// Human-readable reason, recorded for the admin surface.
    pub reason: String,
}
