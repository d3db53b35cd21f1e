use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

use super::state::AppState;
use crate::bootstrap::InterviewConfig;
use crate::session::{Command, SessionView};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub command: &'static str,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

async fn dispatch(state: &AppState, name: &'static str, command: Command) -> axum::response::Response {
    info!("Control request: {}", name);

    match state.session.send(command).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(AcceptedResponse {
                command: name,
                status: "accepted".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to dispatch {}: {}", name, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /interview
/// Current view of the session
pub async fn get_interview(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.session.view())
}

/// POST /interview/configure
/// Create the session for a configuration (no-op if it is unchanged)
pub async fn configure(
    State(state): State<AppState>,
    Json(config): Json<InterviewConfig>,
) -> impl IntoResponse {
    dispatch(&state, "configure", Command::Configure(config)).await
}

/// POST /interview/start
pub async fn start(State(state): State<AppState>) -> impl IntoResponse {
    dispatch(&state, "start", Command::Start).await
}

/// POST /interview/mic/start
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    dispatch(&state, "mic/start", Command::StartRecording).await
}

/// POST /interview/mic/stop
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    dispatch(&state, "mic/stop", Command::StopRecording).await
}

/// POST /interview/mic/mute
/// Toggle the manual mute
pub async fn toggle_mute(State(state): State<AppState>) -> impl IntoResponse {
    dispatch(&state, "mic/mute", Command::ToggleMute).await
}

/// POST /interview/advisory/dismiss
pub async fn dismiss_advisory(State(state): State<AppState>) -> impl IntoResponse {
    dispatch(&state, "advisory/dismiss", Command::DismissAdvisory).await
}

/// POST /interview/leave
/// Tear the session down
pub async fn leave(State(state): State<AppState>) -> impl IntoResponse {
    dispatch(&state, "leave", Command::Leave).await
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
