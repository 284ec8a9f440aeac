//! Transport contract between a server connection and the wire.
//!
//! The runtime never talks to a network itself. Every connection is handed a
//! [`TransportParts`] bundle by a [`Dialer`]: a request/reply handle
//! implementing [`ServerTransport`] plus the channel on which the server
//! pushes asynchronous [`ServerMessage`]s. Concrete wire protocols (sockets,
//! pipes) live outside this crate; the in-memory [`ChannelTransport`] pair is
//! provided for tests and local loopback embedding.
//!
//! Transports are also the liveness bookkeeper: they record the timestamp of
//! the last message written to and received from the wire, and the heartbeat
//! loop reads those timestamps to detect a silent peer.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use themelink_protocol::ServerMessage;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Boxed future returned by object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Contract between a server connection and the underlying wire.
///
/// `send` is asynchronous: the result is the peer's reply, delivered
/// whenever it arrives. Callers must not assume synchronous completion.
pub trait ServerTransport: Send + Sync {
    /// Sends an event to the server and resolves with the peer's reply.
    fn send(&self, event: &str, payload: Value) -> BoxFuture<'_, Result<Value>>;

    /// Timestamp of the last message written to the wire, if any.
    fn last_message_sent(&self) -> Option<Instant>;

    /// Timestamp of the last message received from the server, if any.
    fn last_message_received(&self) -> Option<Instant>;
}

/// Send/receive bookkeeping shared by transport implementations.
///
/// Implementations call [`mark_sent`](Self::mark_sent) /
/// [`mark_received`](Self::mark_received) on every message crossing the
/// wire; the heartbeat loop reads the timestamps back through
/// [`ServerTransport`].
#[derive(Debug, Default)]
pub struct TransportTimestamps {
    sent: Mutex<Option<Instant>>,
    received: Mutex<Option<Instant>>,
}

impl TransportTimestamps {
    /// Records that a message was written to the wire just now.
    pub fn mark_sent(&self) {
        *self.sent.lock() = Some(Instant::now());
    }

    /// Records that a message arrived from the server just now.
    pub fn mark_received(&self) {
        *self.received.lock() = Some(Instant::now());
    }

    /// Timestamp of the last outbound message.
    pub fn last_sent(&self) -> Option<Instant> {
        *self.sent.lock()
    }

    /// Timestamp of the last inbound message.
    pub fn last_received(&self) -> Option<Instant> {
        *self.received.lock()
    }
}

/// A freshly dialed transport session.
///
/// Bundles the request/reply handle with the inbound push channel, mirroring
/// the two directions a session can carry messages in. Each connection owns
/// its parts exclusively; sessions are never shared.
pub struct TransportParts {
    /// Request/reply handle for client-initiated exchanges.
    pub transport: Arc<dyn ServerTransport>,
    /// Messages pushed by the server outside any request/reply pair.
    pub messages: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Establishes transport sessions on demand, one per connection.
pub trait Dialer: Send + Sync {
    /// Dials a fresh session with the server.
    fn dial(&self) -> BoxFuture<'_, Result<TransportParts>>;
}

/// Request captured by a [`TransportPeer`], with a handle to reply.
pub struct PeerRequest {
    /// Event name the client sent.
    pub event: String,
    /// Request body the client sent.
    pub payload: Value,
    reply_tx: oneshot::Sender<Result<Value>>,
}

impl PeerRequest {
    /// Answers the request with the given reply body.
    pub fn respond(self, reply: Value) {
        let _ = self.reply_tx.send(Ok(reply));
    }

    /// Fails the request with a transport error.
    pub fn reject(self, reason: &str) {
        let _ = self.reply_tx.send(Err(Error::Transport(reason.to_string())));
    }
}

/// In-memory loopback implementation of [`ServerTransport`].
///
/// [`pair`](Self::pair) returns the client half (already bundled as
/// [`TransportParts`]) together with a [`TransportPeer`] playing the server
/// side. The peer receives every request sent by the client and decides how
/// to answer, which makes the pair a scriptable stand-in for a real server.
pub struct ChannelTransport {
    requests_tx: mpsc::UnboundedSender<PeerRequest>,
    timestamps: Arc<TransportTimestamps>,
}

impl ChannelTransport {
    /// Creates a connected loopback pair.
    pub fn pair() -> (TransportParts, TransportPeer) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let timestamps = Arc::new(TransportTimestamps::default());

        let transport = Arc::new(ChannelTransport {
            requests_tx,
            timestamps: Arc::clone(&timestamps),
        });
        let peer = TransportPeer {
            requests_rx,
            messages_tx,
            timestamps,
        };

        (
            TransportParts {
                transport,
                messages: messages_rx,
            },
            peer,
        )
    }
}

impl ServerTransport for ChannelTransport {
    fn send(&self, event: &str, payload: Value) -> BoxFuture<'_, Result<Value>> {
        let event = event.to_string();
        Box::pin(async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.timestamps.mark_sent();
            self.requests_tx
                .send(PeerRequest {
                    event,
                    payload,
                    reply_tx,
                })
                .map_err(|_| Error::ChannelClosed)?;

            let reply = reply_rx.await.map_err(|_| Error::ChannelClosed)?;
            // A rejection is still a message from the peer.
            self.timestamps.mark_received();
            reply
        })
    }

    fn last_message_sent(&self) -> Option<Instant> {
        self.timestamps.last_sent()
    }

    fn last_message_received(&self) -> Option<Instant> {
        self.timestamps.last_received()
    }
}

/// Server side of a [`ChannelTransport`] pair.
pub struct TransportPeer {
    requests_rx: mpsc::UnboundedReceiver<PeerRequest>,
    messages_tx: mpsc::UnboundedSender<ServerMessage>,
    timestamps: Arc<TransportTimestamps>,
}

impl TransportPeer {
    /// Waits for the next request sent by the client half.
    ///
    /// Returns `None` once the client half is dropped.
    pub async fn next_request(&mut self) -> Option<PeerRequest> {
        self.requests_rx.recv().await
    }

    /// Pushes an asynchronous message to the client.
    ///
    /// Returns false once the client's message channel is gone.
    pub fn push(&self, event: &str, payload: Value) -> bool {
        let delivered = self
            .messages_tx
            .send(ServerMessage::new(event, payload))
            .is_ok();
        if delivered {
            self.timestamps.mark_received();
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn send_round_trips_through_the_peer() {
        let (parts, mut peer) = ChannelTransport::pair();

        let transport = Arc::clone(&parts.transport);
        let exchange = tokio::spawn(async move {
            transport.send("hello", json!({"module": "midnight"})).await
        });

        let request = peer.next_request().await.unwrap();
        assert_eq!(request.event, "hello");
        assert_eq!(request.payload["module"], "midnight");
        request.respond(json!({"accepted": true}));

        let reply = exchange.await.unwrap().unwrap();
        assert_eq!(reply["accepted"], true);

        assert!(parts.transport.last_message_sent().is_some());
        assert!(parts.transport.last_message_received().is_some());
    }

    #[tokio::test]
    async fn dropped_peer_fails_the_send() {
        let (parts, peer) = ChannelTransport::pair();
        drop(peer);

        let result = parts.transport.send("hello", Value::Null).await;
        assert!(matches!(result, Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn unanswered_request_fails_the_send() {
        let (parts, mut peer) = ChannelTransport::pair();

        let transport = Arc::clone(&parts.transport);
        let exchange = tokio::spawn(async move { transport.send("hello", Value::Null).await });

        let request = peer.next_request().await.unwrap();
        drop(request);

        let result = exchange.await.unwrap();
        assert!(matches!(result, Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn pushed_messages_reach_the_client_and_mark_receipt() {
        let (mut parts, peer) = ChannelTransport::pair();

        assert!(peer.push("theme.updated", json!({"accent": "#123456"})));
        let message = parts.messages.recv().await.unwrap();
        assert_eq!(message.event, "theme.updated");
        assert!(parts.transport.last_message_received().is_some());
        assert!(parts.transport.last_message_sent().is_none());
    }

    #[tokio::test]
    async fn rejection_counts_as_a_received_message() {
        let (parts, mut peer) = ChannelTransport::pair();

        let transport = Arc::clone(&parts.transport);
        let exchange = tokio::spawn(async move { transport.send("ping", Value::Null).await });

        peer.next_request().await.unwrap().reject("backpressure");
        let result = exchange.await.unwrap();
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(parts.transport.last_message_received().is_some());
    }
}
