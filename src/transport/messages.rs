use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::{AudioChunk, CaptureError, StopReason};

/// Interview phase reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Greeting,
    Questions,
    Followup,
    Wrapup,
}

/// Authoritative interview progress pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSnapshot {
    #[serde(default)]
    pub session_id: String,
    pub current_phase: Phase,
    pub current_question_index: u32,
    pub total_questions: u32,
    pub progress_percentage: f32,
    pub is_complete: bool,
    #[serde(default)]
    pub is_started: bool,
}

/// An interviewer turn: text, optional speech, and the progress it implies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    #[serde(default)]
    pub session_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>, // Base64-encoded speech
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    pub current_phase: Phase,
    pub current_question_index: u32,
    pub total_questions: u32,
    pub progress_percentage: f32,
    pub is_complete: bool,
    #[serde(default)]
    pub should_ask_followup: bool,
}

impl AiResponse {
    /// The progress part of the response
    pub fn snapshot(&self) -> InterviewSnapshot {
        InterviewSnapshot {
            session_id: self.session_id.clone(),
            current_phase: self.current_phase,
            current_question_index: self.current_question_index,
            total_questions: self.total_questions,
            progress_percentage: self.progress_percentage,
            is_complete: self.is_complete,
            is_started: true,
        }
    }
}

/// Transcript of the candidate's speech, interim or final
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub is_final: bool,
    #[serde(default)]
    pub should_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_message: Option<String>,
}

/// Events received from the interview service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "voiceInterview:joined")]
    Joined { state: InterviewSnapshot },
    #[serde(rename = "voiceInterview:started")]
    Started(AiResponse),
    #[serde(rename = "voiceInterview:response")]
    Response(AiResponse),
    #[serde(rename = "voiceInterview:transcription")]
    Transcription(Transcription),
    #[serde(rename = "voiceInterview:state")]
    State { state: InterviewSnapshot },
    #[serde(rename = "voiceInterview:complete")]
    Complete { session_id: String },
    #[serde(rename = "voiceInterview:error")]
    Error { error: String },
}

/// Audio sent to the interview service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPayload {
    pub session_id: String,
    pub audio_data: String, // Base64-encoded WAV
    pub audio_format: String,
    pub sample_rate: u32,
    pub is_final: bool,
    /// Only present on the final chunk of a turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl AudioPayload {
    pub fn from_chunk(
        session_id: &str,
        chunk: &AudioChunk,
        stop_reason: Option<StopReason>,
    ) -> Result<Self, CaptureError> {
        let wav = chunk.to_wav()?;
        Ok(Self {
            session_id: session_id.to_string(),
            audio_data: base64::engine::general_purpose::STANDARD.encode(wav),
            audio_format: "wav".to_string(),
            sample_rate: chunk.sample_rate,
            is_final: chunk.is_final,
            stop_reason: if chunk.is_final { stop_reason } else { None },
        })
    }
}

/// Commands sent to the interview service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "voiceInterview:join")]
    Join { session_id: String, user_id: String },
    #[serde(rename = "voiceInterview:start")]
    Start { session_id: String },
    #[serde(rename = "voiceInterview:audio")]
    Audio(AudioPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::Start { .. } => "start",
            ClientEvent::Audio(_) => "audio",
        }
    }
}

/// What a connection delivers: server events plus connection lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connected,
    Disconnected,
    Server(ServerEvent),
}
