//! Interview session orchestration
//!
//! This module provides the session controller that manages:
//! - Turn-taking between the interviewer and the candidate
//! - Endpointing and transmission of the candidate's answers
//! - Progress, transcript and advisories shown to observers
//! - Error classification and recovery

mod config;
mod controller;
mod handle;
mod policy;
mod progress;
mod state;
mod timeline;
mod view;

pub use config::SessionTimings;
pub use controller::{ControllerSettings, SessionController, SessionServices};
pub use handle::{Command, ControllerError, SessionHandle};
pub use policy::{
    Advisory, AdvisoryKind, ErrorPolicy, Remediation, SessionFailure, Severity,
    DEFAULT_SOFT_ERROR_MARKERS, DEVICE_UNAVAILABLE_MESSAGE, NO_AUDIO_MESSAGE, NO_RESPONSE_MESSAGE,
    PERMISSION_DENIED_MESSAGE, RETRY_MESSAGE, SEND_FAILED_MESSAGE,
};
pub use progress::{Progress, ProgressTracker, DEFAULT_TOTAL_QUESTIONS};
pub use state::{AiState, ConversationState, MicStatus, SessionStatus, Turn};
pub use timeline::{Speaker, Timeline, TimelineEntry};
pub use view::SessionView;
