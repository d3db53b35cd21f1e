use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioFrame, CaptureConstraints, CaptureError};
use super::format::FrameConverter;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Streams a WAV file as if it were a live device.
///
/// Frames are paced in real time. Once the file is exhausted the backend keeps
/// delivering digital silence until it is stopped, the way an open microphone
/// would after the speaker goes quiet.
pub struct FileBackend {
    path: PathBuf,
    constraints: CaptureConstraints,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: PathBuf, constraints: CaptureConstraints) -> Self {
        Self {
            path,
            constraints,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{:#}", e)))?;

        let mut converter = FrameConverter::new(
            audio.sample_rate,
            audio.channels,
            self.constraints.sample_rate,
            self.constraints.channels,
        )?;

        let (tx, rx) = mpsc::channel(64);
        let constraints = self.constraints.clone();

        let task = tokio::spawn(async move {
            let frame_ms = constraints.buffer_duration_ms.max(10);
            let channels = audio.channels.max(1) as usize;
            let samples_per_frame = (audio.sample_rate as u64 * frame_ms / 1000) as usize * channels;
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            let mut offset = 0usize;
            let mut timestamp_ms = 0u64;

            loop {
                ticker.tick().await;

                let samples = if offset < audio.samples.len() {
                    let end = (offset + samples_per_frame).min(audio.samples.len());
                    let slice = audio.samples[offset..end].to_vec();
                    offset = end;
                    slice
                } else {
                    vec![0i16; samples_per_frame]
                };

                let frame = AudioFrame {
                    samples,
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                };
                timestamp_ms += frame_ms;

                let frame = match converter.convert(frame) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Dropping file capture: {}", e);
                        break;
                    }
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        info!("File capture started: {}", self.path.display());
        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("File capture task failed: {}", e);
                }
            }
            info!("File capture stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
