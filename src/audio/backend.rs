use std::path::PathBuf;

use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of the frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        let per_channel = self.samples.len() as u64 / self.channels.max(1) as u64;
        per_channel * 1000 / self.sample_rate.max(1) as u64
    }
}

/// What the capture device is asked for when it is acquired.
///
/// Backends apply what they can and log the rest; the processing flags are
/// requests, not guarantees.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    /// Target sample rate (will resample if needed)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            noise_suppression: true,
            echo_cancellation: true,
            auto_gain_control: true,
            sample_rate: 16000, // 16kHz for speech-to-text
            channels: 1,        // Mono
            buffer_duration_ms: 100,
        }
    }
}

/// Errors raised while acquiring or driving a capture device
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("A recording is already active")]
    AlreadyRecording,

    #[error("Failed to encode audio: {0}")]
    Encode(String),

    #[error("Failed to convert audio format: {0}")]
    Resample(String),
}

/// Audio capture backend trait
///
/// Implementations:
/// - File: streams a WAV recording in real time (headless runs and tests)
/// - Microphone: cpal input device (behind the `microphone` feature)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing audio and release the device. Stopping twice is a no-op.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Hands out a fresh backend for every recording turn.
pub trait BackendProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioBackend>, CaptureError>;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default input device
    Microphone,
    /// WAV file input (for testing/headless runs)
    File(PathBuf),
}

/// Audio backend factory
#[derive(Debug, Clone)]
pub struct AudioBackendFactory {
    source: AudioSource,
    constraints: CaptureConstraints,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, constraints: CaptureConstraints) -> Self {
        Self { source, constraints }
    }

    /// Create audio backend based on the configured source
    pub fn create(
        source: &AudioSource,
        constraints: CaptureConstraints,
    ) -> Result<Box<dyn AudioBackend>, CaptureError> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::MicrophoneBackend;
                    Ok(Box::new(MicrophoneBackend::new(constraints)))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = constraints;
                    Err(CaptureError::DeviceUnavailable(
                        "built without the `microphone` feature".to_string(),
                    ))
                }
            }

            AudioSource::File(path) => {
                use super::file::FileBackend;
                Ok(Box::new(FileBackend::new(path.clone(), constraints)))
            }
        }
    }
}

impl BackendProvider for AudioBackendFactory {
    fn open(&self) -> Result<Box<dyn AudioBackend>, CaptureError> {
        Self::create(&self.source, self.constraints.clone())
    }
}
