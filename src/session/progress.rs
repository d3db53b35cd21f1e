use serde::Serialize;

use crate::transport::{InterviewSnapshot, Phase};

pub const DEFAULT_TOTAL_QUESTIONS: u32 = 5;

/// Interview progress as last reported by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub phase: Phase,
    pub question_index: u32,
    pub total_questions: u32,
    pub percentage: f32,
    pub is_complete: bool,
    pub is_started: bool,
}

/// Projection of server snapshots; nothing here is derived locally
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    progress: Progress,
}

impl ProgressTracker {
    /// Total before any snapshot: the backend's count, then the requested
    /// count, then the default
    pub fn new(created_total: u32, requested_total: Option<u32>) -> Self {
        let total_questions = if created_total > 0 {
            created_total
        } else {
            requested_total
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_TOTAL_QUESTIONS)
        };

        Self {
            progress: Progress {
                phase: Phase::Greeting,
                question_index: 0,
                total_questions,
                percentage: 0.0,
                is_complete: false,
                is_started: false,
            },
        }
    }

    /// Overwrite local progress with the snapshot
    pub fn apply(&mut self, snapshot: &InterviewSnapshot) -> &Progress {
        self.progress = Progress {
            phase: snapshot.current_phase,
            question_index: snapshot.current_question_index,
            total_questions: snapshot.total_questions,
            percentage: snapshot.progress_percentage.clamp(0.0, 100.0),
            is_complete: snapshot.is_complete,
            is_started: snapshot.is_started || self.progress.is_started,
        };
        &self.progress
    }

    pub fn mark_started(&mut self) {
        self.progress.is_started = true;
    }

    pub fn mark_complete(&mut self) {
        self.progress.is_complete = true;
    }

    pub fn current(&self) -> &Progress {
        &self.progress
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(0, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(index: u32, pct: f32) -> InterviewSnapshot {
        InterviewSnapshot {
            session_id: "abc123".into(),
            current_phase: Phase::Questions,
            current_question_index: index,
            total_questions: 5,
            progress_percentage: pct,
            is_complete: false,
            is_started: true,
        }
    }

    #[test]
    fn test_initial_total() {
        assert_eq!(ProgressTracker::new(7, Some(3)).current().total_questions, 7);
        assert_eq!(ProgressTracker::new(0, Some(3)).current().total_questions, 3);
        assert_eq!(ProgressTracker::new(0, None).current().total_questions, 5);
    }

    #[test]
    fn test_snapshots_overwrite() {
        let mut tracker = ProgressTracker::default();
        tracker.apply(&snapshot(3, 60.0));
        // Server moved back; we follow it
        let progress = tracker.apply(&snapshot(2, 40.0)).clone();
        assert_eq!(progress.question_index, 2);
        assert_eq!(progress.percentage, 40.0);
        assert_eq!(progress.phase, Phase::Questions);
    }
}
