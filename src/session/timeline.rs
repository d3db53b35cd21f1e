use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Ai,
    User,
    System,
}

/// A single line of the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only conversation transcript
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Append a line; blank text is ignored
    pub fn push(&mut self, speaker: Speaker, text: &str) -> Option<&TimelineEntry> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.entries.push(TimelineEntry {
            id: Uuid::new_v4(),
            speaker,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        self.entries.last()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_trims_and_skips_blank() {
        let mut timeline = Timeline::default();
        assert!(timeline.push(Speaker::User, "   ").is_none());
        timeline.push(Speaker::Ai, " Tell me about yourself. ");
        timeline.push(Speaker::User, "I build backends");

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.entries()[0].text, "Tell me about yourself.");
        assert_eq!(timeline.entries()[1].speaker, Speaker::User);
        assert_ne!(timeline.entries()[0].id, timeline.entries()[1].id);
    }
}
