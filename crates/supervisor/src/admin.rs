//! Minimal loopback admin surface.
//!
//! The full administrative UI and REST surface is an out-of-scope external
//! collaborator (spec §1); what belongs to the supervisor itself is just
//! enough surface for an external admin layer (or an operator with `curl`)
//! to drive the two mutating operations the supervisor glue owns —
//! `reloadConfig()` and `triggerRestart()` — plus a read-only status probe.
//! Mutating routes require the `x-api-token` header (§5/§6); the status
//! probe does not, since it carries no secret and isn't mutating.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use supervisor_core::protocol_constants::{API_TOKEN_HEADER, EXIT_CODE_RESTART};
use supervisor_core::Supervisor;

use crate::config;

/// Shared state for the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub supervisor: Arc<Supervisor>,
    pub config_path: PathBuf,
}

/// Builds the admin router. Mounted alongside the player transport's
/// router under the same loopback-only listener.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/status", get(status))
        .route("/admin/reload", post(reload))
        .route("/admin/restart", post(restart))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn status(State(state): State<AdminState>) -> impl IntoResponse {
    let connected = state.supervisor.is_player_connected().await;
    let events = state.supervisor.event_log_snapshot().await;
    (
        StatusCode::OK,
        Json(json!({
            "playerConnected": connected,
            "events": events,
        })),
    )
}

/// Rejects requests whose `x-api-token` header does not match the current
/// generation's secret. An empty expected token (should not happen —
/// bootstrap always generates or loads one) never matches.
async fn check_token(state: &AdminState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = state.supervisor.api_token().await;
    let provided = headers
        .get(API_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if expected.is_empty() || provided != expected {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_api_token" })),
        )
            .into_response());
    }
    Ok(())
}

async fn reload(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_token(&state, &headers).await {
        return resp;
    }
    let new_config = match config::load(&state.config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("[Admin] config reload rejected: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_config", "message": e.to_string() })),
            )
                .into_response();
        }
    };
    match state.supervisor.reload_config(&new_config).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "reload_failed", "message": e.to_string() })),
        )
            .into_response(),
    }
}

/// Mirrors `triggerRestart()` (§4.6): flush state, close sockets, exit 75
/// for a launcher wrapper to interpret as "restart me". The HTTP response
/// never actually reaches the caller since the process exits first — this
/// mirrors a `kill -TERM` style one-way admin action more than a normal
/// request/response round trip.
async fn restart(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_token(&state, &headers).await {
        return resp;
    }
    log::warn!("[Admin] restart requested via admin surface");
    state.supervisor.shutdown().await;
    std::process::exit(EXIT_CODE_RESTART);
}
