//! In-process transport
//!
//! The client half implements [`Transport`]; the server half hands out one
//! [`LoopbackConnection`] per opened session so tests (and offline demos) can
//! read what the client sent and script what the service answers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::messages::{ClientEvent, InboundEvent, ServerEvent};
use super::{Connection, EventSink, Transport, TransportError};

#[derive(Default)]
struct Switches {
    fail_sends: AtomicBool,
    refuse: AtomicBool,
}

#[derive(Clone)]
pub struct LoopbackTransport {
    accepted: mpsc::UnboundedSender<LoopbackConnection>,
    switches: Arc<Switches>,
}

pub struct LoopbackServer {
    incoming: mpsc::UnboundedReceiver<LoopbackConnection>,
    switches: Arc<Switches>,
}

/// Server end of one session's connection
pub struct LoopbackConnection {
    pub session_id: String,
    client_events: mpsc::UnboundedReceiver<ClientEvent>,
    events: mpsc::Sender<InboundEvent>,
    closed: Arc<AtomicBool>,
}

impl LoopbackTransport {
    pub fn new() -> (Self, LoopbackServer) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        let switches = Arc::new(Switches::default());
        (
            Self {
                accepted,
                switches: switches.clone(),
            },
            LoopbackServer { incoming, switches },
        )
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    async fn open(&self, session_id: &str) -> Result<Connection, TransportError> {
        if self.switches.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("loopback server refused connection".to_string()));
        }

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(64);
        let closed = Arc::new(AtomicBool::new(false));

        let server_end = LoopbackConnection {
            session_id: session_id.to_string(),
            client_events: client_rx,
            events: events_tx,
            closed: closed.clone(),
        };
        self.accepted
            .send(server_end)
            .map_err(|_| TransportError::Connect("loopback server is gone".to_string()))?;

        debug!("Loopback connection opened for {}", session_id);

        Ok(Connection {
            sink: Box::new(LoopbackSink {
                client: Some(client_tx),
                switches: self.switches.clone(),
                closed,
            }),
            events: events_rx,
        })
    }
}

impl LoopbackServer {
    /// Wait for the next connection a client opens
    pub async fn accept(&mut self) -> Option<LoopbackConnection> {
        self.incoming.recv().await
    }

    /// Make every subsequent send fail, as a broken socket would
    pub fn fail_sends(&self, fail: bool) {
        self.switches.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `open` calls fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.switches.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl LoopbackConnection {
    /// Next event the client sent; `None` once the client closed
    pub async fn next_client_event(&mut self) -> Option<ClientEvent> {
        self.client_events.recv().await
    }

    pub fn try_next_client_event(&mut self) -> Option<ClientEvent> {
        self.client_events.try_recv().ok()
    }

    pub async fn push(&self, event: ServerEvent) {
        let _ = self.events.send(InboundEvent::Server(event)).await;
    }

    pub async fn disconnect(&self) {
        let _ = self.events.send(InboundEvent::Disconnected).await;
    }

    pub async fn reconnect(&self) {
        let _ = self.events.send(InboundEvent::Connected).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct LoopbackSink {
    client: Option<mpsc::UnboundedSender<ClientEvent>>,
    switches: Arc<Switches>,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl EventSink for LoopbackSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        if self.switches.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                event: event.name(),
                reason: "loopback send failure".to_string(),
            });
        }

        let client = self.client.as_ref().ok_or(TransportError::Closed)?;
        client.send(event.clone()).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.client = None;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
