//! End-of-utterance detection
//!
//! A recording ends on whichever comes first:
//! - manual: the user stops or mutes (handled by the caller)
//! - silence: speech was seen, the recording is long enough, and interim
//!   transcripts have stopped arriving
//! - timeout: the hard cap on a single recording
//!
//! The endpointer is a pure function of the instants it is given, so the
//! controller can poll it from its own timer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Why a recording was stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    Silence,
    Timeout,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Manual => "manual",
            StopReason::Silence => "silence",
            StopReason::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Silence never ends a recording shorter than this
    pub min_recording: Duration,
    /// Quiet period after the last interim transcript
    pub silence_threshold: Duration,
    /// Grace period between detecting silence and stopping
    pub silence_debounce: Duration,
    /// Hard cap on a single recording
    pub max_recording: Duration,
    /// How often the controller evaluates the endpointer
    pub poll_interval: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            min_recording: Duration::from_millis(1000),
            silence_threshold: Duration::from_millis(2500),
            silence_debounce: Duration::from_millis(350),
            max_recording: Duration::from_millis(60_000),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Endpointer {
    config: EndpointConfig,
    started_at: Instant,
    has_spoken: bool,
    last_update: Option<Instant>,
}

impl Endpointer {
    pub fn new(config: EndpointConfig, started_at: Instant) -> Self {
        Self {
            config,
            started_at,
            has_spoken: false,
            last_update: None,
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn has_spoken(&self) -> bool {
        self.has_spoken
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Record an interim transcript. Blank text is not evidence of speech.
    ///
    /// Returns true if the update counted as speech.
    pub fn observe_interim(&mut self, text: &str, at: Instant) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.mark_spoken(at);
        true
    }

    /// Record speech that was heard before this endpointer existed
    pub fn mark_spoken(&mut self, at: Instant) {
        self.has_spoken = true;
        self.last_update = Some(at);
    }

    /// Evaluate the triggers at `now`.
    ///
    /// `ai_playing` suppresses the silence trigger; the timeout still applies.
    pub fn evaluate(&self, now: Instant, ai_playing: bool) -> Option<StopReason> {
        let elapsed = now.saturating_duration_since(self.started_at);

        if elapsed >= self.config.max_recording {
            return Some(StopReason::Timeout);
        }

        if ai_playing || elapsed < self.config.min_recording || !self.has_spoken {
            return None;
        }

        let last = self.last_update?;
        if now.saturating_duration_since(last) >= self.config.silence_threshold {
            return Some(StopReason::Silence);
        }

        None
    }

    /// When the silence trigger could fire at the earliest, given what is known now.
    pub fn silence_due_at(&self) -> Option<Instant> {
        let last = self.last_update?;
        Some((last + self.config.silence_threshold).max(self.started_at + self.config.min_recording))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_silence_never_fires_before_threshold() {
        let t0 = Instant::now();
        let mut ep = Endpointer::new(EndpointConfig::default(), t0);
        ep.observe_interim("I have five years", t0);

        assert_eq!(ep.evaluate(t0 + ms(1000), false), None);
        assert_eq!(ep.evaluate(t0 + ms(2499), false), None);
        assert_eq!(ep.evaluate(t0 + ms(2500), false), Some(StopReason::Silence));
        assert_eq!(ep.silence_due_at(), Some(t0 + ms(2500)));
    }

    #[test]
    fn test_silence_requires_speech() {
        let t0 = Instant::now();
        let mut ep = Endpointer::new(EndpointConfig::default(), t0);
        ep.observe_interim("   ", t0);

        assert!(!ep.has_spoken());
        assert_eq!(ep.evaluate(t0 + ms(10_000), false), None);
    }

    #[test]
    fn test_silence_respects_minimum_recording() {
        let t0 = Instant::now();
        let config = EndpointConfig {
            silence_threshold: ms(200),
            ..EndpointConfig::default()
        };
        let mut ep = Endpointer::new(config, t0);
        ep.observe_interim("hi", t0);

        assert_eq!(ep.evaluate(t0 + ms(999), false), None);
        assert_eq!(ep.evaluate(t0 + ms(1000), false), Some(StopReason::Silence));
    }

    #[test]
    fn test_silence_suppressed_while_ai_plays() {
        let t0 = Instant::now();
        let mut ep = Endpointer::new(EndpointConfig::default(), t0);
        ep.observe_interim("hello", t0);

        assert_eq!(ep.evaluate(t0 + ms(5000), true), None);
        assert_eq!(ep.evaluate(t0 + ms(5000), false), Some(StopReason::Silence));
    }

    #[test]
    fn test_timeout_despite_continuous_speech() {
        let t0 = Instant::now();
        let mut ep = Endpointer::new(EndpointConfig::default(), t0);

        let mut t = 0;
        while t < 60_000 {
            ep.observe_interim("still talking", t0 + ms(t));
            assert_eq!(ep.evaluate(t0 + ms(t), false), None, "stopped early at {}ms", t);
            t += 500;
        }

        assert_eq!(ep.evaluate(t0 + ms(59_999), false), None);
        assert_eq!(ep.evaluate(t0 + ms(60_000), false), Some(StopReason::Timeout));
        assert_eq!(ep.evaluate(t0 + ms(60_000), true), Some(StopReason::Timeout));
    }

    #[test]
    fn test_speech_before_start_counts() {
        let heard = Instant::now();
        let mut ep = Endpointer::new(EndpointConfig::default(), heard + ms(300));
        ep.mark_spoken(heard);

        assert!(ep.has_spoken());
        assert_eq!(ep.silence_due_at(), Some(heard + ms(2500)));
        assert_eq!(ep.evaluate(heard + ms(2499), false), None);
        assert_eq!(ep.evaluate(heard + ms(2500), false), Some(StopReason::Silence));
    }

    #[test]
    fn test_stop_reason_wire_names() {
        assert_eq!(serde_json::to_string(&StopReason::Silence).unwrap(), "\"silence\"");
        assert_eq!(StopReason::Timeout.to_string(), "timeout");
    }
}
