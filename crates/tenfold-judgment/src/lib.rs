//! Tenfold — Judgment resolution.
//!
//! A judgment is a probabilistic check requested mid-narrative: one
//! uniform draw over `1..=sides`, classified against a target threshold.
//! Values inside the critical band at either extreme upgrade the outcome
//! to a critical regardless of the target comparison. Pure and stateless;
//! reproducibility comes from the injected `RandomSource`.

use std::fmt;

use serde::{Deserialize, Serialize};

use tenfold_core::rng::RandomSource;

/// Default number of faces on the judgment die.
pub const DEFAULT_SIDES: u32 = 100;

/// Default target when the model omits one.
pub const DEFAULT_TARGET: u32 = 50;

/// Resolution tuning. The critical band is measured from each end of the
/// die: a draw of at most `critical_band` is always a critical success, a
/// draw above `sides - critical_band` always a critical failure.
#[derive(Debug, Clone, Copy)]
pub struct JudgmentConfig {
    pub critical_band: u32,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self { critical_band: 5 }
    }
}

/// A judgment request embedded in a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentRequest {
    /// What is being judged, e.g. "stealth" or "persuasion".
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_target")]
    pub target: u32,
    #[serde(default = "default_sides")]
    pub sides: u32,
}

fn default_kind() -> String {
    "judgment".to_owned()
}

fn default_target() -> u32 {
    DEFAULT_TARGET
}

fn default_sides() -> u32 {
    DEFAULT_SIDES
}

/// Four-tier judgment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentOutcome {
    CriticalSuccess,
    Success,
    Failure,
    CriticalFailure,
}

impl fmt::Display for JudgmentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CriticalSuccess => "critical success",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::CriticalFailure => "critical failure",
        })
    }
}

/// A fully resolved judgment, emitted to the client as a `roll_event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentRoll {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: u32,
    pub sides: u32,
    pub result: u32,
    pub outcome: JudgmentOutcome,
}

impl JudgmentRoll {
    /// System line appended to the narrative and fed back to the model
    /// when the story continues from the roll.
    #[must_use]
    pub fn result_text(&self) -> String {
        format!(
            "[judgment '{}' (d{}): target {}, rolled {}, outcome: {}]",
            self.kind, self.sides, self.target, self.result, self.outcome
        )
    }
}

/// Resolves a judgment from a single draw.
pub fn resolve(
    request: &JudgmentRequest,
    config: JudgmentConfig,
    rng: &mut dyn RandomSource,
) -> JudgmentRoll {
    let sides = request.sides.max(1);
    let target = request.target.clamp(1, sides);
    let result = rng.draw(sides);
    JudgmentRoll {
        kind: request.kind.clone(),
        target,
        sides,
        result,
        outcome: classify(result, target, sides, config.critical_band),
    }
}

fn classify(value: u32, target: u32, sides: u32, band: u32) -> JudgmentOutcome {
    if value <= band {
        JudgmentOutcome::CriticalSuccess
    } else if value > sides.saturating_sub(band) {
        JudgmentOutcome::CriticalFailure
    } else if value <= target {
        JudgmentOutcome::Success
    } else {
        JudgmentOutcome::Failure
    }
}
