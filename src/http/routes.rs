use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::state::AppState;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/interview", get(handlers::get_interview))
        .route("/interview/configure", post(handlers::configure))
        .route("/interview/start", post(handlers::start))
        .route("/interview/leave", post(handlers::leave))
        // Microphone control
        .route("/interview/mic/start", post(handlers::start_recording))
        .route("/interview/mic/stop", post(handlers::stop_recording))
        .route("/interview/mic/mute", post(handlers::toggle_mute))
        .route("/interview/advisory/dismiss", post(handlers::dismiss_advisory))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // Local UIs are served from other origins
        .layer(CorsLayer::permissive())
        .with_state(state)
}
