//! Event transport between the candidate and the interview service
//!
//! - `messages`: wire format of client and server events
//! - `channel`: the per-session channel the controller talks to
//! - `nats`: transport over NATS subjects
//! - `loopback`: in-process transport with a scriptable server end

pub mod channel;
pub mod loopback;
pub mod messages;
pub mod nats;

use tokio::sync::mpsc;

pub use channel::TransportChannel;
pub use loopback::{LoopbackConnection, LoopbackServer, LoopbackTransport};
pub use messages::{
    AiResponse, AudioPayload, ClientEvent, InboundEvent, InterviewSnapshot, Phase, ServerEvent,
    Transcription,
};
pub use nats::NatsTransport;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to send {event}: {reason}")]
    Send { event: &'static str, reason: String },

    #[error("Connection closed")]
    Closed,
}

/// Outbound half of an open connection
#[async_trait::async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An open connection scoped to one interview session
pub struct Connection {
    pub sink: Box<dyn EventSink>,
    pub events: mpsc::Receiver<InboundEvent>,
}

/// Opens connections to the interview service
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<Connection, TransportError>;
}
