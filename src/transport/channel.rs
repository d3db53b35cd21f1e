use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{AudioPayload, ClientEvent, InboundEvent};
use super::{EventSink, Transport, TransportError};

type SendAck = oneshot::Sender<Result<(), TransportError>>;

enum Outbound {
    Event {
        event: ClientEvent,
        ack: Option<SendAck>,
    },
    Close,
}

/// One session's connection to the interview service.
///
/// All outbound events go through a single writer task, so they reach the
/// wire in the order they were queued: previews of a turn always precede its
/// final chunk. `join` is sent on open and again after every reconnect.
pub struct TransportChannel {
    session_id: String,
    user_id: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::Receiver<InboundEvent>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl TransportChannel {
    /// Connect and announce ourselves with `join`
    pub async fn open(
        transport: &dyn Transport,
        session_id: &str,
        user_id: &str,
    ) -> Result<Self, TransportError> {
        info!("Opening channel for session {}", session_id);

        let connection = transport.open(session_id).await?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let join = ClientEvent::Join {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
        };

        let writer = tokio::spawn(write_loop(connection.sink, outbound_rx));
        let reader = tokio::spawn(read_loop(
            connection.events,
            inbound_tx,
            outbound_tx.clone(),
            join,
        ));

        let channel = Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            outbound: outbound_tx,
            inbound: inbound_rx,
            reader,
            writer: Some(writer),
        };

        channel.join();
        Ok(channel)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn join(&self) {
        self.enqueue(
            ClientEvent::Join {
                session_id: self.session_id.clone(),
                user_id: self.user_id.clone(),
            },
            None,
        );
    }

    pub fn start(&self) {
        self.enqueue(
            ClientEvent::Start {
                session_id: self.session_id.clone(),
            },
            None,
        );
    }

    /// Best effort: failures are logged by the writer and otherwise ignored
    pub fn send_preview(&self, payload: AudioPayload) {
        self.enqueue(ClientEvent::Audio(payload), None);
    }

    /// Queue the final chunk; the receiver resolves once it has been written
    pub fn send_final(&self, payload: AudioPayload) -> oneshot::Receiver<Result<(), TransportError>> {
        let (ack, rx) = oneshot::channel();
        self.enqueue(ClientEvent::Audio(payload), Some(ack));
        rx
    }

    fn enqueue(&self, event: ClientEvent, ack: Option<SendAck>) {
        let name = event.name();
        if let Err(mpsc::error::SendError(Outbound::Event { ack: Some(ack), .. })) =
            self.outbound.send(Outbound::Event { event, ack })
        {
            let _ = ack.send(Err(TransportError::Closed));
        } else {
            debug!("Queued {} for session {}", name, self.session_id);
        }
    }

    /// Next inbound event; `None` once the connection is gone for good
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.inbound.recv().await
    }

    /// Full teardown: stop delivering events and close the connection
    pub async fn leave(mut self) {
        info!("Leaving session {}", self.session_id);

        self.reader.abort();
        self.inbound.close();
        let _ = self.outbound.send(Outbound::Close);

        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                warn!("Channel writer failed during leave: {}", e);
            }
        }
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn write_loop(mut sink: Box<dyn EventSink>, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Event { event, ack } => {
                let result = sink.send(&event).await;
                match ack {
                    Some(ack) => {
                        let _ = ack.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("Dropping {} event: {}", event.name(), e);
                        }
                    }
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = sink.close().await {
        warn!("Failed to close connection: {}", e);
    }
    debug!("Channel writer stopped");
}

async fn read_loop(
    mut events: mpsc::Receiver<InboundEvent>,
    inbound: mpsc::Sender<InboundEvent>,
    outbound: mpsc::UnboundedSender<Outbound>,
    join: ClientEvent,
) {
    let mut lost = false;

    while let Some(event) = events.recv().await {
        match &event {
            InboundEvent::Disconnected => lost = true,
            InboundEvent::Connected => {
                if !lost {
                    // initial connect; join was already sent by open()
                    continue;
                }
                lost = false;
                info!("Connection restored, rejoining");
                let _ = outbound.send(Outbound::Event {
                    event: join.clone(),
                    ack: None,
                });
            }
            InboundEvent::Server(_) => {}
        }

        if inbound.send(event).await.is_err() {
            break;
        }
    }

    debug!("Channel reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::LoopbackTransport;
    use crate::transport::messages::ServerEvent;

    fn payload(is_final: bool) -> AudioPayload {
        AudioPayload {
            session_id: "abc123".into(),
            audio_data: String::new(),
            audio_format: "wav".into(),
            sample_rate: 16000,
            is_final,
            stop_reason: None,
        }
    }

    #[tokio::test]
    async fn test_join_on_open_and_order_preserved() {
        let (transport, mut server) = LoopbackTransport::new();
        let channel = TransportChannel::open(&transport, "abc123", "user-1").await.unwrap();
        let mut conn = server.accept().await.unwrap();

        channel.send_preview(payload(false));
        let ack = channel.send_final(payload(true));

        assert_eq!(
            conn.next_client_event().await,
            Some(ClientEvent::Join {
                session_id: "abc123".into(),
                user_id: "user-1".into()
            })
        );
        assert!(matches!(conn.next_client_event().await, Some(ClientEvent::Audio(p)) if !p.is_final));
        assert!(matches!(conn.next_client_event().await, Some(ClientEvent::Audio(p)) if p.is_final));
        assert!(ack.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_final_send_failure_is_reported() {
        let (transport, mut server) = LoopbackTransport::new();
        let channel = TransportChannel::open(&transport, "abc123", "user-1").await.unwrap();
        let _conn = server.accept().await.unwrap();

        server.fail_sends(true);
        let ack = channel.send_final(payload(true));
        assert!(ack.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_rejoins_after_reconnect() {
        let (transport, mut server) = LoopbackTransport::new();
        let mut channel = TransportChannel::open(&transport, "abc123", "user-1").await.unwrap();
        let mut conn = server.accept().await.unwrap();
        assert!(matches!(conn.next_client_event().await, Some(ClientEvent::Join { .. })));

        conn.disconnect().await;
        conn.reconnect().await;

        assert_eq!(channel.recv().await, Some(InboundEvent::Disconnected));
        assert_eq!(channel.recv().await, Some(InboundEvent::Connected));
        assert!(matches!(conn.next_client_event().await, Some(ClientEvent::Join { .. })));

        conn.push(ServerEvent::Complete {
            session_id: "abc123".into(),
        })
        .await;
        assert!(matches!(
            channel.recv().await,
            Some(InboundEvent::Server(ServerEvent::Complete { .. }))
        ));
    }

    #[tokio::test]
    async fn test_leave_closes_connection() {
        let (transport, mut server) = LoopbackTransport::new();
        let channel = TransportChannel::open(&transport, "abc123", "user-1").await.unwrap();
        let mut conn = server.accept().await.unwrap();

        channel.leave().await;

        assert!(matches!(conn.next_client_event().await, Some(ClientEvent::Join { .. })));
        assert_eq!(conn.next_client_event().await, None);
        assert!(conn.is_closed());
    }
}
