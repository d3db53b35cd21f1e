pub mod audio;
pub mod bootstrap;
pub mod config;
pub mod http;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendFactory, AudioCapturePipeline, AudioChunk, AudioFile, AudioFrame,
    AudioSink, AudioSource, CaptureConstraints, ChunkConfig, PacedSink, PlaybackController,
    StopReason,
};
pub use bootstrap::{
    Analysis, BackendError, HttpBackend, InterviewBackend, InterviewConfig, SessionBootstrapper,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    ConversationState, ControllerSettings, SessionController, SessionHandle, SessionServices,
    SessionView,
};
pub use transport::{LoopbackTransport, NatsTransport, Transport, TransportChannel};
