//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::SessionStats;
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", get(sessions_handler))
        .route("/sessions/:id", get(session_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    store: &'static str,
    active_sessions: usize,
    cleanup_leader: Option<Uuid>,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        store: state.store_kind(),
        active_sessions: state.sessions.active_sessions(),
        cleanup_leader: state.sessions.leader(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionStats>,
}

async fn sessions_handler(State(state): State<AppState>) -> Json<SessionsResponse> {
    let mut sessions = state.sessions.all();
    sessions.sort_by_key(|s| s.player_id);
    Json(SessionsResponse { sessions })
}

async fn session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionStats>, AppError> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::BadRequest("Invalid session id".to_string()))?;
    state
        .sessions
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session {}", id)))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
