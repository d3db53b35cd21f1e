use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::EndpointConfig;

/// Timers driving turn-taking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    /// Shortest recording that silence may end
    pub min_recording_ms: u64,

    /// Quiet period after the last transcript update that ends a turn
    pub silence_threshold_ms: u64,

    /// Grace period before a silence stop is committed
    pub silence_debounce_ms: u64,

    /// Hard cap on a single answer
    pub max_recording_ms: u64,

    /// How often endpointing is evaluated while recording
    pub silence_poll_ms: u64,

    /// Pause between the interviewer finishing and the mic opening
    pub settle_ms: u64,

    /// How long to wait for any server reaction to a final chunk
    pub response_timeout_ms: u64,

    /// Stand-in playback length for responses without audio
    pub no_audio_delay_ms: u64,

    /// How long a response may wait for the final transcription
    pub transcript_grace_ms: u64,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            min_recording_ms: 1_000,
            silence_threshold_ms: 2_500,
            silence_debounce_ms: 350,
            max_recording_ms: 60_000,
            silence_poll_ms: 1_000,
            settle_ms: 400,
            response_timeout_ms: 30_000,
            no_audio_delay_ms: 500,
            transcript_grace_ms: 500,
        }
    }
}

impl SessionTimings {
    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            min_recording: Duration::from_millis(self.min_recording_ms),
            silence_threshold: Duration::from_millis(self.silence_threshold_ms),
            silence_debounce: Duration::from_millis(self.silence_debounce_ms),
            max_recording: Duration::from_millis(self.max_recording_ms),
            poll_interval: Duration::from_millis(self.silence_poll_ms),
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn no_audio_delay(&self) -> Duration {
        Duration::from_millis(self.no_audio_delay_ms)
    }

    pub fn transcript_grace(&self) -> Duration {
        Duration::from_millis(self.transcript_grace_ms)
    }
}
