//! Administrative surface.
//!
//! Token-guarded REST endpoints that reuse the orchestrator's primitives;
//! nothing here bypasses the per-player lock.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, instrument};

use tenfold_core::player::PlayerId;
use tenfold_core::verdict::{AbuseLevel, Verdict};

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.admin_token else {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorBody {
                error: "admin_disabled",
                message: "no admin token is configured".to_owned(),
            }),
        )
            .into_response());
    };
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: "unauthorized",
                message: "missing or invalid admin token".to_owned(),
            }),
        )
            .into_response())
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "session_not_found",
            message: "no session exists for that player".to_owned(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

/// GET /sessions
#[instrument(skip_all)]
async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let limit = params.limit.unwrap_or(50).min(500);
    match state.orchestrator.recent_sessions(limit).await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

/// GET /sessions/{player_id} — the full record, transcript included.
#[instrument(skip(state, headers))]
async fn session_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(player_id): Path<String>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    match state
        .orchestrator
        .session_detail(&PlayerId::new(player_id))
        .await
    {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => not_found(),
        Err(err) => ApiError(err).into_response(),
    }
}

/// POST /sessions/{player_id}/clear
#[instrument(skip(state, headers))]
async fn clear_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(player_id): Path<String>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let player_id = PlayerId::new(player_id);
    match state.orchestrator.clear_session(&player_id).await {
        Ok(()) => {
            info!(player_id = %player_id, "session cleared by admin");
            Json(serde_json::json!({"ok": true})).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct OpportunitiesRequest {
    opportunities: i32,
}

/// POST /sessions/{player_id}/opportunities
#[instrument(skip(state, headers, request))]
async fn set_opportunities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(player_id): Path<String>,
    Json(request): Json<OpportunitiesRequest>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let player_id = PlayerId::new(player_id);
    match state
        .orchestrator
        .set_opportunities(&player_id, request.opportunities)
        .await
    {
        Ok(Some(snapshot)) => {
            info!(player_id = %player_id, opportunities = request.opportunities, "opportunities force-set");
            Json(snapshot).into_response()
        }
        Ok(None) => not_found(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct PunishRequest {
    level: AbuseLevel,
    reason: String,
}

/// POST /sessions/{player_id}/punish — queues a manual punishment for
/// the player's next turn.
#[instrument(skip(state, headers, request))]
async fn queue_punishment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(player_id): Path<String>,
    Json(request): Json<PunishRequest>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let player_id = PlayerId::new(player_id);
    let verdict = Verdict {
        level: request.level,
        reason: request.reason,
    };
    match state
        .orchestrator
        .queue_manual_punishment(&player_id, verdict)
        .await
    {
        Ok(Some(())) => Json(serde_json::json!({"ok": true})).into_response(),
        Ok(None) => not_found(),
        Err(err) => ApiError(err).into_response(),
    }
}

/// Returns the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{player_id}", get(session_detail))
        .route("/sessions/{player_id}/clear", post(clear_session))
        .route("/sessions/{player_id}/opportunities", post(set_opportunities))
        .route("/sessions/{player_id}/punish", post(queue_punishment))
}
