use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Creating,
    Connecting,
    Ready,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiState {
    Idle,
    Speaking,
    Listening,
    Thinking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicStatus {
    Disabled,
    Preparing,
    Listening,
    Recording,
    Processing,
    Muted,
}

/// Who holds the floor while the interview is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Turn {
    /// Interviewer audio is playing; the mic is muted
    Speaking,
    /// Waiting for the candidate; the mic is idle
    Listening,
    /// Acquiring the capture device
    Preparing,
    Recording,
    /// Final chunk sent, waiting on the interviewer
    Processing,
    /// Last interviewer turn played, waiting for the server to close the session
    Closing,
}

/// Every legal combination of session status, interviewer state and mic status
///
/// The three observable enums are projections of this type, so a combination
/// such as "interviewer speaking while the mic records" cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "turn", rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    Creating,
    Connecting,
    Ready,
    Running(Turn),
    Completed,
    Failed,
}

impl ConversationState {
    pub fn session_status(&self) -> SessionStatus {
        match self {
            ConversationState::Idle => SessionStatus::Idle,
            ConversationState::Creating => SessionStatus::Creating,
            ConversationState::Connecting => SessionStatus::Connecting,
            ConversationState::Ready => SessionStatus::Ready,
            ConversationState::Running(_) => SessionStatus::Running,
            ConversationState::Completed => SessionStatus::Completed,
            ConversationState::Failed => SessionStatus::Error,
        }
    }

    pub fn ai_state(&self) -> AiState {
        match self {
            ConversationState::Running(Turn::Speaking) => AiState::Speaking,
            ConversationState::Running(Turn::Processing) => AiState::Thinking,
            ConversationState::Running(Turn::Closing) => AiState::Idle,
            ConversationState::Running(_) => AiState::Listening,
            _ => AiState::Idle,
        }
    }

    pub fn mic_status(&self) -> MicStatus {
        match self {
            ConversationState::Running(Turn::Speaking) => MicStatus::Muted,
            ConversationState::Running(Turn::Listening) => MicStatus::Listening,
            ConversationState::Running(Turn::Preparing) => MicStatus::Preparing,
            ConversationState::Running(Turn::Recording) => MicStatus::Recording,
            ConversationState::Running(Turn::Processing) => MicStatus::Processing,
            _ => MicStatus::Disabled,
        }
    }

    pub fn turn(&self) -> Option<Turn> {
        match self {
            ConversationState::Running(turn) => Some(*turn),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ConversationState::Running(_))
    }

    /// Completed or failed: only `leave` moves the session on
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationState::Completed | ConversationState::Failed)
    }

    /// Every value of the type
    pub fn all() -> Vec<ConversationState> {
        let mut all = vec![
            ConversationState::Idle,
            ConversationState::Creating,
            ConversationState::Connecting,
            ConversationState::Ready,
            ConversationState::Completed,
            ConversationState::Failed,
        ];
        all.extend(
            [
                Turn::Speaking,
                Turn::Listening,
                Turn::Preparing,
                Turn::Recording,
                Turn::Processing,
                Turn::Closing,
            ]
            .into_iter()
            .map(ConversationState::Running),
        );
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaking_implies_muted() {
        for state in ConversationState::all() {
            if state.ai_state() == AiState::Speaking {
                assert_eq!(state.mic_status(), MicStatus::Muted, "{:?}", state);
            }
        }
    }

    #[test]
    fn test_recording_implies_listening() {
        for state in ConversationState::all() {
            if state.mic_status() == MicStatus::Recording {
                assert_eq!(state.ai_state(), AiState::Listening, "{:?}", state);
            }
        }
    }

    #[test]
    fn test_completed_is_quiet() {
        for state in ConversationState::all() {
            if state.session_status() == SessionStatus::Completed {
                assert_eq!(state.mic_status(), MicStatus::Disabled);
                assert_eq!(state.ai_state(), AiState::Idle);
            }
        }
    }

    #[test]
    fn test_running_start_is_speaking_and_muted() {
        let state = ConversationState::Running(Turn::Speaking);
        assert_eq!(state.session_status(), SessionStatus::Running);
        assert_eq!(state.ai_state(), AiState::Speaking);
        assert_eq!(state.mic_status(), MicStatus::Muted);
    }

    #[test]
    fn test_failed_projects_to_error() {
        assert_eq!(ConversationState::Failed.session_status(), SessionStatus::Error);
        assert!(ConversationState::Failed.is_terminal());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(ConversationState::Running(Turn::Recording)).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["turn"], "recording");
    }
}
