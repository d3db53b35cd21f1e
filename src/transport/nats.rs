//! Transport over NATS
//!
//! Each session gets its own client so connection lifecycle events map onto
//! one session. Client events are published to
//! `voice-interview.{session_id}.client`; the service answers on
//! `voice-interview.{session_id}.server`.

use async_nats::{Client, ConnectOptions, Event};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{ClientEvent, InboundEvent, ServerEvent};
use super::{Connection, EventSink, Transport, TransportError};

pub fn client_subject(session_id: &str) -> String {
    format!("voice-interview.{}.client", session_id)
}

pub fn server_subject(session_id: &str) -> String {
    format!("voice-interview.{}.server", session_id)
}

pub struct NatsTransport {
    url: String,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    async fn open(&self, session_id: &str) -> Result<Connection, TransportError> {
        info!("Connecting to NATS at {}", self.url);

        let (events_tx, events_rx) = mpsc::channel(64);

        let lifecycle = events_tx.clone();
        let client = ConnectOptions::new()
            .event_callback(move |event| {
                let lifecycle = lifecycle.clone();
                async move {
                    let inbound = match event {
                        Event::Connected => InboundEvent::Connected,
                        Event::Disconnected => InboundEvent::Disconnected,
                        other => {
                            debug!("NATS event: {}", other);
                            return;
                        }
                    };
                    let _ = lifecycle.send(inbound).await;
                }
            })
            .connect(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let subject = server_subject(session_id);
        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("Subscribed to {}", subject);

        let reader = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                match serde_json::from_slice::<ServerEvent>(&message.payload) {
                    Ok(event) => {
                        if events_tx.send(InboundEvent::Server(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed server event on {}: {}", subject, e),
                }
            }
        });

        Ok(Connection {
            sink: Box::new(NatsSink {
                client,
                subject: client_subject(session_id),
                reader,
            }),
            events: events_rx,
        })
    }
}

struct NatsSink {
    client: Client,
    subject: String,
    reader: JoinHandle<()>,
}

#[async_trait::async_trait]
impl EventSink for NatsSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let send_error = |reason: String| TransportError::Send {
            event: event.name(),
            reason,
        };

        let payload = serde_json::to_vec(event).map_err(|e| send_error(e.to_string()))?;
        let bytes = payload.len();

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| send_error(e.to_string()))?;

        debug!("Published {} to {} ({} bytes)", event.name(), self.subject, bytes);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        info!("Closing NATS connection");
        self.reader.abort();
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::Send {
                event: "flush",
                reason: e.to_string(),
            })
    }
}

impl Drop for NatsSink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_are_scoped_to_session() {
        assert_eq!(client_subject("abc123"), "voice-interview.abc123.client");
        assert_eq!(server_subject("abc123"), "voice-interview.abc123.server");
    }
}
