//! HTTP API for local control of the interview session
//!
//! - GET /health - Health check
//! - GET /interview - Current session view
//! - POST /interview/configure - Create the session for a config
//! - POST /interview/start - Ask the interviewer to begin
//! - POST /interview/mic/{start,stop,mute} - Microphone control
//! - POST /interview/advisory/dismiss - Clear the current notice
//! - POST /interview/leave - Tear the session down

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
