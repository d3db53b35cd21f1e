use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// What the candidate asked to be interviewed on
///
/// Immutable for the life of a session: a config that differs in any field
/// is a different session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterviewConfig {
    pub job_role: String,
    pub experience_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
    pub interview_type: String,
    /// Interviewer persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_questions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl InterviewConfig {
    /// Structural hash over every field
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Response wrapper used by every backend endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of a failed request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Post-interview report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub session_id: String,
    pub overall_score: f32,
    pub total_questions: u32,
    pub answered_questions: u32,
    #[serde(default)]
    pub conversation_summary: String,
    #[serde(default)]
    pub strengths_summary: Vec<String>,
    #[serde(default)]
    pub improvement_areas: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub communication_score: f32,
    pub content_score: f32,
    pub engagement_score: f32,
    #[serde(default)]
    pub completed_at: String,
}
