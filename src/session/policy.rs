use serde::{Deserialize, Serialize};

use crate::audio::CaptureError;
use crate::bootstrap::BackendError;

/// Server errors containing one of these are recoverable
pub const DEFAULT_SOFT_ERROR_MARKERS: [&str; 2] = ["too short", "at least 2 words"];

pub const RETRY_MESSAGE: &str = "We couldn't hear you. Please speak again.";
pub const NO_AUDIO_MESSAGE: &str = "No audio was recorded. Please check your microphone and try again.";
pub const NO_RESPONSE_MESSAGE: &str = "No response received from server. Please try speaking again.";
pub const SEND_FAILED_MESSAGE: &str = "Failed to send audio. Please check your connection and try again.";
pub const PERMISSION_DENIED_MESSAGE: &str = "Microphone access denied. Please check permissions.";
pub const DEVICE_UNAVAILABLE_MESSAGE: &str =
    "Could not access the microphone. Please check your device and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Turn-local: the session carries on
    Soft,
    /// The session cannot continue
    Hard,
}

#[derive(Debug, Clone)]
pub struct ErrorPolicy {
    soft_markers: Vec<String>,
}

impl ErrorPolicy {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            soft_markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Classify an error pushed by the interview service
    pub fn classify(&self, message: &str) -> Severity {
        let message = message.to_lowercase();
        if self.soft_markers.iter().any(|m| message.contains(m.as_str())) {
            Severity::Soft
        } else {
            Severity::Hard
        }
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SOFT_ERROR_MARKERS)
    }
}

/// What the user can do about a fatal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    PurchaseCredits,
    Reauthenticate,
    Retry,
    Leave,
}

/// A failure that reached top-level status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub message: String,
    pub remediation: Remediation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl SessionFailure {
    pub fn from_backend(error: &BackendError) -> Self {
        let remediation = match error {
            BackendError::InsufficientCredits { .. } => Remediation::PurchaseCredits,
            BackendError::Unauthenticated { .. } => Remediation::Reauthenticate,
            BackendError::Failed { .. } => Remediation::Retry,
        };
        Self {
            message: error.message().to_string(),
            remediation,
            status: error.status(),
        }
    }

    /// Hard error from the interview service, shown verbatim
    pub fn from_server(message: &str) -> Self {
        Self {
            message: message.to_string(),
            remediation: Remediation::Leave,
            status: None,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            remediation: Remediation::Retry,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    Retry,
    NoAudio,
    NoResponse,
    SendFailed,
    Microphone,
}

/// Non-fatal, dismissible notice for the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub message: String,
}

impl Advisory {
    /// Server asked for the answer again; its own wording wins when present
    pub fn retry(message: Option<&str>) -> Self {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(RETRY_MESSAGE);
        Self {
            kind: AdvisoryKind::Retry,
            message: message.to_string(),
        }
    }

    pub fn no_audio() -> Self {
        Self {
            kind: AdvisoryKind::NoAudio,
            message: NO_AUDIO_MESSAGE.to_string(),
        }
    }

    pub fn no_response() -> Self {
        Self {
            kind: AdvisoryKind::NoResponse,
            message: NO_RESPONSE_MESSAGE.to_string(),
        }
    }

    pub fn send_failed() -> Self {
        Self {
            kind: AdvisoryKind::SendFailed,
            message: SEND_FAILED_MESSAGE.to_string(),
        }
    }

    pub fn microphone(error: &CaptureError) -> Self {
        let message = match error {
            CaptureError::PermissionDenied(_) => PERMISSION_DENIED_MESSAGE,
            _ => DEVICE_UNAVAILABLE_MESSAGE,
        };
        Self {
            kind: AdvisoryKind::Microphone,
            message: message.to_string(),
        }
    }
}
