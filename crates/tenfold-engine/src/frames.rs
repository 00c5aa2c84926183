//! Client-facing message frames.

use serde::{Deserialize, Serialize};

use tenfold_judgment::JudgmentRoll;
use tenfold_session::GameSession;

/// Authoritative post-turn snapshot. The model transcript never crosses
/// the client boundary, so it is absent here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub opportunities_remaining: i32,
    pub is_in_trial: bool,
    pub daily_success_achieved: bool,
    pub current_life: Option<serde_json::Value>,
    pub display_history: Vec<String>,
    pub is_processing: bool,
}

impl From<&GameSession> for StateSnapshot {
    fn from(session: &GameSession) -> Self {
        Self {
            opportunities_remaining: session.opportunities_remaining,
            is_in_trial: session.is_in_trial,
            daily_success_achieved: session.daily_success_achieved,
            current_life: session.current_life.clone(),
            display_history: session.display_history.clone(),
            is_processing: session.is_processing,
        }
    }
}

/// One outbound frame. Within a turn the delivery order is
/// `stream_start, stream_chunk*, [roll_event], stream_end, full_state`,
/// or a single `error` when the turn could not start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TurnFrame {
    StreamStart,
    StreamChunk { content: String },
    RollEvent(JudgmentRoll),
    StreamEnd,
    FullState(StateSnapshot),
    Error { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_serialize_with_type_tag() {
        let frame = TurnFrame::StreamChunk { content: "once".into() };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "stream_chunk");
        assert_eq!(value["data"]["content"], "once");
    }

    #[test]
    fn test_unit_frames_serialize_without_payload() {
        let value = serde_json::to_value(TurnFrame::StreamStart).unwrap();
        assert_eq!(value["type"], "stream_start");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_roll_event_payload_shape() {
        let frame = TurnFrame::RollEvent(JudgmentRoll {
            kind: "stealth".into(),
            target: 50,
            sides: 100,
            result: 3,
            outcome: tenfold_judgment::JudgmentOutcome::CriticalSuccess,
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "roll_event");
        assert_eq!(value["data"]["type"], "stealth");
        assert_eq!(value["data"]["outcome"], "critical_success");
    }
}
