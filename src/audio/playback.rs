use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decode::{decode_audio, DecodedAudio, PlaybackError};

/// Where decoded interviewer speech is rendered.
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Render the audio, returning once it has finished playing
    async fn play(&self, audio: DecodedAudio) -> Result<(), PlaybackError>;
}

/// Holds for the decoded duration without touching an output device.
///
/// Used for headless runs, where timing matters but nobody is listening.
#[derive(Debug, Default, Clone)]
pub struct PacedSink;

#[async_trait::async_trait]
impl AudioSink for PacedSink {
    async fn play(&self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        tokio::time::sleep(audio.duration()).await;
        Ok(())
    }
}

/// How a playback ended
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    /// Audio played to the end
    Completed,
    /// The turn had no audio; the fixed delay elapsed
    Silent,
    /// Decoding or output failed; logged, never surfaced
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackFinished {
    pub token: u64,
    pub outcome: PlaybackOutcome,
}

/// Plays one interviewer utterance at a time.
///
/// Every `play` gets a new token and supersedes whatever was playing; the
/// completion report carries the token so late reports can be told apart.
pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    silent_turn_delay: Duration,
    next_token: u64,
    current: Option<(u64, JoinHandle<()>)>,
    events: mpsc::UnboundedSender<PlaybackFinished>,
}

impl PlaybackController {
    pub fn new(
        sink: Arc<dyn AudioSink>,
        silent_turn_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackFinished>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                sink,
                silent_turn_delay,
                next_token: 0,
                current: None,
                events,
            },
            rx,
        )
    }

    /// Start playing a base64 payload (or the silent delay when there is none)
    pub fn play(&mut self, audio_data: Option<String>, format: Option<String>) -> u64 {
        self.stop();

        self.next_token += 1;
        let token = self.next_token;
        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let delay = self.silent_turn_delay;

        let payload = audio_data.filter(|data| !data.is_empty());
        info!(
            "Starting playback {} ({})",
            token,
            if payload.is_some() { "audio" } else { "silent" }
        );

        let task = tokio::spawn(async move {
            let outcome = match payload {
                None => {
                    tokio::time::sleep(delay).await;
                    PlaybackOutcome::Silent
                }
                Some(data) => match render(sink, data, format).await {
                    Ok(()) => PlaybackOutcome::Completed,
                    Err(e) => {
                        warn!("Playback {} failed: {}", token, e);
                        PlaybackOutcome::Failed(e.to_string())
                    }
                },
            };

            debug!("Playback {} finished: {:?}", token, outcome);
            let _ = events.send(PlaybackFinished { token, outcome });
        });

        self.current = Some((token, task));
        token
    }

    /// Stop the active playback, if any. No completion is reported for it.
    pub fn stop(&mut self) {
        if let Some((token, task)) = self.current.take() {
            if !task.is_finished() {
                info!("Stopping playback {}", token);
            }
            task.abort();
        }
    }

    /// Called when a completion report arrives; true if it belongs to the active playback.
    pub fn finish(&mut self, token: u64) -> bool {
        match &self.current {
            Some((active, _)) if *active == token => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn active_token(&self) -> Option<u64> {
        self.current.as_ref().map(|(token, _)| *token)
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn render(
    sink: Arc<dyn AudioSink>,
    data: String,
    format: Option<String>,
) -> Result<(), PlaybackError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|e| PlaybackError::Payload(e.to_string()))?;

    let decoded = tokio::task::spawn_blocking(move || decode_audio(bytes, format.as_deref()))
        .await
        .map_err(|e| PlaybackError::Decode(e.to_string()))??;

    sink.play(decoded).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::encode_wav;

    fn wav_base64(ms: u64) -> String {
        let samples = vec![1000i16; (16 * ms) as usize];
        let bytes = encode_wav(&samples, 16000, 1).unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_turn_uses_fixed_delay() {
        let (mut playback, mut rx) = PlaybackController::new(Arc::new(PacedSink), Duration::from_millis(500));
        let started = tokio::time::Instant::now();

        let token = playback.play(None, None);
        let done = rx.recv().await.unwrap();

        assert_eq!(done, PlaybackFinished { token, outcome: PlaybackOutcome::Silent });
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(600));
        assert!(playback.finish(token));
        assert!(!playback.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_plays_for_its_duration() {
        let (mut playback, mut rx) = PlaybackController::new(Arc::new(PacedSink), Duration::from_millis(500));
        let started = tokio::time::Instant::now();

        let token = playback.play(Some(wav_base64(1200)), Some("wav".into()));
        let done = rx.recv().await.unwrap();

        assert_eq!(done.token, token);
        assert_eq!(done.outcome, PlaybackOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_playback_supersedes_old() {
        let (mut playback, mut rx) = PlaybackController::new(Arc::new(PacedSink), Duration::from_millis(500));

        let first = playback.play(Some(wav_base64(5000)), Some("wav".into()));
        let second = playback.play(None, None);
        assert_ne!(first, second);
        assert_eq!(playback.active_token(), Some(second));

        let done = rx.recv().await.unwrap();
        assert_eq!(done.token, second);
        assert!(!playback.finish(first));
        assert!(playback.finish(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_payload_reports_failure() {
        let (mut playback, mut rx) = PlaybackController::new(Arc::new(PacedSink), Duration::from_millis(500));

        let token = playback.play(Some("not base64!!".into()), Some("mp3".into()));
        let done = rx.recv().await.unwrap();

        assert_eq!(done.token, token);
        assert!(matches!(done.outcome, PlaybackOutcome::Failed(_)));
    }
}
