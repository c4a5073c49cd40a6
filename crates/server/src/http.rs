//! HTTP endpoints
//!
//! Session creation plus health and metrics. Everything conversational
//! happens on the WebSocket.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use avatar_persistence::{now_ms, SessionRecord};

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::WebSocketHandler;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/ws/:session_id", get(WebSocketHandler::handle))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    persona_id: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: String,
    websocket_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vision_capture_interval_secs: Option<u64>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, StatusCode> {
    // Reject unknown personas up front rather than at first turn.
    let persona = state
        .personas
        .lookup(&request.persona_id)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    let session = state
        .sessions
        .create(&request.persona_id, request.user_id.clone())
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let record = SessionRecord {
        session_id: session.id.clone(),
        user_id: session.user_id.clone(),
        persona_id: session.persona_id.clone(),
        started_at_ms: now_ms(),
        ended_at_ms: None,
    };
    if let Err(e) = state.session_records.create(&record).await {
        // The session stays functional without its durable record.
        tracing::warn!(session_id = %session.id, error = %e, "session record not persisted");
    }

    Ok(Json(CreateSessionResponse {
        websocket_url: format!("/ws/{}", session.id),
        session_id: session.id.clone(),
        vision_capture_interval_secs: persona.vision_capture_interval_secs,
    }))
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    session_id: String,
    persona_id: String,
    active: bool,
    age_secs: u64,
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, StatusCode> {
    let session = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(SessionInfo {
        session_id: session.id.clone(),
        persona_id: session.persona_id.clone(),
        active: session.is_active(),
        age_secs: session.created_at.elapsed().as_secs(),
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.sessions.get(&id).is_none() {
        return StatusCode::NOT_FOUND;
    }
    state.purchases.clear(&id);
    state.sessions.remove(&id);
    StatusCode::NO_CONTENT
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn readiness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "active_sessions": state.sessions.count(),
    }))
}
