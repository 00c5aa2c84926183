//! The per-connection controller.
//!
//! One instance per live WebSocket, bound to exactly one authenticated
//! player for its lifetime. Inbound `{action}` messages are handed to the
//! orchestrator on detached tasks; outbound frames are relayed from the
//! player's frame bus. A disconnect interrupts nothing: the turn keeps
//! running against the store, and a reconnecting controller receives the
//! authoritative snapshot at attach time plus whatever frames follow.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use tenfold_core::error::GameError;
use tenfold_core::player::PlayerId;
use tenfold_engine::{StateSnapshot, TurnFrame};

use crate::state::AppState;

/// Buffer size for the per-connection outbound channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Inbound action message.
#[derive(Debug, Deserialize)]
struct ClientAction {
    action: String,
}

/// GET /api/v1/game/ws
///
/// Authentication happens before the upgrade so an unauthenticated
/// socket is never accepted.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(player_id) = params
        .token
        .as_deref()
        .and_then(|token| state.auth.authenticate(token))
    else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, player_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, player_id: PlayerId) {
    info!(player_id = %player_id, "connection established");
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(CONNECTION_CHANNEL_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Subscribe before the initial snapshot so no frame can fall between.
    let frames = state.orchestrator.subscribe(&player_id);

    // The attach-time snapshot doubles as at-least-once delivery of the
    // final state for a client that reconnected after its turn completed.
    match state.orchestrator.ensure_session(&player_id).await {
        Ok(session) => {
            send_frame(&tx, &TurnFrame::FullState(StateSnapshot::from(&session))).await;
        }
        Err(err) => {
            send_frame(
                &tx,
                &TurnFrame::Error {
                    detail: err.client_detail().to_owned(),
                },
            )
            .await;
        }
    }

    let relay = tokio::spawn(relay_frames(frames, tx.clone()));

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientAction>(&text) {
                Ok(ClientAction { action }) => {
                    let orchestrator = Arc::clone(&state.orchestrator);
                    let player_id = player_id.clone();
                    // The turn outlives this connection on purpose; its
                    // outcome frames travel the bus.
                    tokio::spawn(async move {
                        if let Err(err) = orchestrator.run_turn(&player_id, &action).await {
                            debug!(player_id = %player_id, error = %err, "turn ended with error");
                        }
                    });
                }
                Err(err) => {
                    warn!(player_id = %player_id, error = %err, "unparsable client message");
                    send_frame(
                        &tx,
                        &TurnFrame::Error {
                            detail: "messages must be {\"action\": \"...\"}".to_owned(),
                        },
                    )
                    .await;
                }
            },
            Ok(Message::Close(_)) => break,
            // Ping/pong bookkeeping is handled by the protocol layer.
            Ok(_) => {}
            Err(err) => {
                warn!(player_id = %player_id, cause = %err, "{}", GameError::StreamAbort);
                break;
            }
        }
    }

    relay.abort();
    drop(tx);
    let _ = writer.await;
    info!(player_id = %player_id, "connection closed");
}

async fn relay_frames(
    mut frames: broadcast::Receiver<TurnFrame>,
    tx: mpsc::Sender<Message>,
) {
    loop {
        match frames.recv().await {
            Ok(frame) => {
                if !send_frame(&tx, &frame).await {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "slow connection, frames dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Serializes and queues one frame; `false` when the connection is gone.
async fn send_frame(tx: &mpsc::Sender<Message>, frame: &TurnFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => tx.send(Message::Text(json.into())).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "frame serialization failed");
            false
        }
    }
}

/// Returns the game WebSocket router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/game/ws", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_action_parses_wire_shape() {
        let parsed: ClientAction = serde_json::from_str(r#"{"action": "start trial"}"#).unwrap();
        assert_eq!(parsed.action, "start trial");
    }

    #[test]
    fn test_client_action_rejects_missing_field() {
        assert!(serde_json::from_str::<ClientAction>(r#"{"act": "x"}"#).is_err());
    }
}
