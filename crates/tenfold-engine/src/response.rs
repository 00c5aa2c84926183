//! Model response parsing and state-delta application.
//!
//! The model answers with prose wrapping a JSON object. The object is
//! located (fenced block first, brace matching second), deserialized into
//! a `TurnResponse`, and its `state_update` applied to the session as
//! dotted-path deltas. A `+` suffix on the final path segment appends to
//! a list instead of replacing it.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use tenfold_judgment::JudgmentRequest;
use tenfold_session::{DAILY_OPPORTUNITIES, GameSession};

/// Structured content of one model response.
#[derive(Debug, Default, Deserialize)]
pub struct TurnResponse {
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub state_update: Map<String, Value>,
    #[serde(default)]
    pub roll_request: Option<JudgmentRequest>,
}

/// Parses the JSON object embedded in a raw model response.
#[must_use]
pub fn parse_response(text: &str) -> Option<TurnResponse> {
    let json = extract_json(text)?;
    serde_json::from_str(json).ok()
}

/// Locates the JSON payload: a ` ```json ` fence wins, otherwise the first
/// balanced brace span.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(fence_start) = text.find("```json") {
        let body = &text[fence_start + 7..];
        if let Some(fence_end) = body.find("```") {
            return Some(body[..fence_end].trim());
        }
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// The trigger name carried by a state update, if any. Triggers are
/// consumed by the orchestrator, never written into the session document.
#[must_use]
pub fn trigger_name(update: &Map<String, Value>) -> Option<&str> {
    update.get("trigger")?.get("name")?.as_str()
}

/// Applies a state update to the session. Known top-level fields map onto
/// their typed counterparts; `current_life` paths mutate the life
/// document; anything else is dropped with a log line.
pub fn apply_state_update(session: &mut GameSession, update: &Map<String, Value>) {
    for (key, value) in update {
        let segments: Vec<&str> = key.split('.').collect();
        match segments[0] {
            "opportunities_remaining" if segments.len() == 1 => {
                if let Some(n) = value.as_i64() {
                    session.opportunities_remaining =
                        n.clamp(0, i64::from(DAILY_OPPORTUNITIES)) as i32;
                }
            }
            "is_in_trial" if segments.len() == 1 => {
                if let Some(flag) = value.as_bool() {
                    session.is_in_trial = flag;
                }
            }
            "daily_success_achieved" if segments.len() == 1 => {
                if let Some(flag) = value.as_bool() {
                    session.daily_success_achieved = flag;
                }
            }
            "current_life" => {
                if segments.len() == 1 {
                    session.current_life = if value.is_null() {
                        None
                    } else {
                        Some(value.clone())
                    };
                } else {
                    let doc = session
                        .current_life
                        .get_or_insert_with(|| Value::Object(Map::new()));
                    apply_path(doc, &segments[1..], value);
                }
            }
            "trigger" => {}
            other => debug!(key = other, "dropping unknown state_update key"),
        }
    }
}

fn apply_path(doc: &mut Value, path: &[&str], value: &Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let mut cursor = doc;
    for segment in parents {
        let entry = cursor
            .as_object_mut()
            .expect("cursor is coerced to an object")
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        cursor = entry;
    }
    let target = cursor
        .as_object_mut()
        .expect("cursor is coerced to an object");

    if let Some(key) = last.strip_suffix('+') {
        match target.get_mut(key) {
            Some(Value::Array(items)) => match value {
                Value::Array(new_items) => items.extend(new_items.iter().cloned()),
                other => items.push(other.clone()),
            },
            _ => {
                let seeded = match value {
                    Value::Array(_) => value.clone(),
                    other => Value::Array(vec![other.clone()]),
                };
                target.insert(key.to_owned(), seeded);
            }
        }
    } else {
        target.insert((*last).to_owned(), value.clone());
    }
}
