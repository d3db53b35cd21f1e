//! Creating interview sessions on the backend

pub mod bootstrapper;
pub mod client;
pub mod messages;

pub use bootstrapper::SessionBootstrapper;
pub use client::{BackendError, HttpBackend, InterviewBackend};
pub use messages::{Analysis, CreatedSession, Difficulty, InterviewConfig};
