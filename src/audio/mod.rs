pub mod backend;
pub mod capture;
pub mod chunk;
pub mod decode;
pub mod endpoint;
pub mod file;
pub mod format;
pub mod level;
pub mod playback;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    AudioBackend, AudioBackendFactory, AudioFrame, AudioSource, BackendProvider, CaptureConstraints,
    CaptureError,
};
pub use capture::{AudioCapturePipeline, CaptureEvent};
pub use chunk::{encode_wav, AudioChunk, ChunkAssembler, ChunkConfig};
pub use decode::{decode_audio, DecodedAudio, PlaybackError};
pub use endpoint::{EndpointConfig, Endpointer, StopReason};
pub use file::{AudioFile, FileBackend};
pub use format::FrameConverter;
pub use level::{rms, SilenceGate, DEFAULT_SILENCE_RMS_THRESHOLD};
pub use playback::{AudioSink, PacedSink, PlaybackController, PlaybackFinished, PlaybackOutcome};
