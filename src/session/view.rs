use serde::Serialize;

use super::policy::{Advisory, SessionFailure};
use super::progress::Progress;
use super::state::{AiState, ConversationState, MicStatus, SessionStatus};
use super::timeline::TimelineEntry;
use crate::bootstrap::Analysis;

/// What observers see of a session, republished after every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub state: ConversationState,

    pub session_status: SessionStatus,

    pub ai_state: AiState,

    pub mic_status: MicStatus,

    /// Backend session id, once created
    pub session_id: Option<String>,

    pub progress: Progress,

    /// Conversation so far, oldest first
    pub timeline: Vec<TimelineEntry>,

    /// Interim transcript of the answer in progress
    pub live_transcript: String,

    /// Dismissible notice; never implies the session is in trouble
    pub advisory: Option<Advisory>,

    /// Set only when the session has failed
    pub error: Option<SessionFailure>,

    /// The candidate muted the mic; it stays closed between turns
    pub manually_muted: bool,

    pub connection_message: Option<String>,

    /// Post-interview report, once fetched
    pub analysis: Option<Analysis>,
}

impl SessionView {
    pub fn new(state: ConversationState, progress: Progress) -> Self {
        Self {
            state,
            session_status: state.session_status(),
            ai_state: state.ai_state(),
            mic_status: state.mic_status(),
            session_id: None,
            progress,
            timeline: Vec::new(),
            live_transcript: String::new(),
            advisory: None,
            error: None,
            manually_muted: false,
            connection_message: None,
            analysis: None,
        }
    }
}
