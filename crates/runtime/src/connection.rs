//! Server connection lifecycle and keep-alive protocol.
//!
//! Two connection strategies share the [`ServerConnection`] contract:
//!
//! - [`PersistentServerConnection`] - a long-lived session kept alive with
//!   ping/pong heartbeats, delivering server-pushed messages to listeners
//! - [`PassingServerConnection`] - exactly one request/response exchange,
//!   closed by the time `connect()` returns
//!
//! # Persistent lifecycle
//!
//! ```text
//! Disconnected ──connect()──> Connecting ──handshake ok──> Connected
//!                                  │                           │
//!                            handshake failed          missed heartbeat,
//!                                  │                  transport error, or
//!                                  ▼                       close()
//!                               Closed  <──────────────────────┘
//! ```
//!
//! `Closed` is terminal. A missed heartbeat in either direction is a hard
//! cutoff, never retried: callers create a new connection instead of
//! reconnecting the old one. Closure caused by the background heartbeat is
//! observed through [`ServerConnection::is_closed`], not through an error.

use crate::error::{Error, Result};
use crate::transport::{BoxFuture, ServerTransport, TransportParts};
use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use themelink_protocol::{ConnectionType, ServerMessage, ServerReply, events};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default interval between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Default deadline for an awaited reply (handshake or pong).
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback invoked for every server message on a subscribed event.
pub type ResponseHandler = Box<dyn Fn(ServerReply) + Send + Sync>;

type ListenerMap = HashMap<String, Arc<dyn Fn(ServerReply) + Send + Sync>>;

/// Timing and handshake knobs shared by both connection variants.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Interval between heartbeat pings while connected.
    pub heartbeat_interval: Duration,
    /// Deadline for any awaited reply: the handshake, the passing variant's
    /// single exchange, and each pong. Also the longest the server may stay
    /// silent before the session is considered dead.
    pub heartbeat_timeout: Duration,
    /// Payload attached to the `hello` handshake.
    pub handshake_payload: Value,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            handshake_payload: Value::Null,
        }
    }
}

/// Common contract over both connection strategies.
///
/// Connections are created by the SDK facade and own their transport session
/// exclusively. `closed` starts false and transitions to true exactly once;
/// [`is_closed`](Self::is_closed) is the only way callers observe that
/// transition.
pub trait ServerConnection: DowncastSync + std::fmt::Debug {
    /// Returns this connection's type tag.
    fn connection_type(&self) -> ConnectionType;

    /// Returns whether the connection to the server is closed.
    fn is_closed(&self) -> bool;

    /// Attempts to establish the session with the server.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Connection`] when the handshake fails or times
    /// out, leaving the connection closed. Calling `connect` on a session
    /// that is already being established fails without creating a second
    /// live session.
    fn connect(&self) -> BoxFuture<'_, Result<()>>;

    /// Registers the listener for messages received on `event`.
    ///
    /// Exactly one listener is kept per event name; registering again
    /// replaces the previous one. Registration never blocks; delivery
    /// happens on message arrival.
    ///
    /// # Errors
    ///
    /// [`PassingServerConnection`] rejects every registration with
    /// [`Error::UnsupportedOperation`].
    fn on(&self, event: &str, handler: ResponseHandler) -> Result<()>;

    /// Closes the connection and cancels any background work. Idempotent.
    fn close(&self);
}

impl_downcast!(sync ServerConnection);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistentState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Long-lived connection kept alive with ping/pong heartbeats.
///
/// While connected, a background task sends a `ping` at every
/// `heartbeat_interval` and records the send time. A single protocol
/// violation closes the session immediately: a pong that misses its
/// deadline, a transport failure, or a server that stays silent past
/// `heartbeat_timeout`.
pub struct PersistentServerConnection {
    transport: Arc<dyn ServerTransport>,
    /// Inbound push channel, taken by the first successful `connect()`.
    messages: Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>,
    listeners: Arc<Mutex<ListenerMap>>,
    state: Arc<Mutex<PersistentState>>,
    last_ping: Arc<Mutex<Option<Instant>>>,
    config: ConnectionConfig,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for PersistentServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentServerConnection").finish()
    }
}

impl PersistentServerConnection {
    /// Creates a connection over a freshly dialed transport session.
    pub fn new(parts: TransportParts, config: ConnectionConfig) -> Self {
        Self {
            transport: parts.transport,
            messages: Mutex::new(Some(parts.messages)),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            state: Arc::new(Mutex::new(PersistentState::Disconnected)),
            last_ping: Arc::new(Mutex::new(None)),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Timestamp of the last heartbeat ping sent, if any.
    pub fn last_ping(&self) -> Option<Instant> {
        *self.last_ping.lock()
    }

    fn mark_closed(state: &Mutex<PersistentState>, shutdown: &CancellationToken) {
        *state.lock() = PersistentState::Closed;
        shutdown.cancel();
    }

    async fn connect_inner(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                PersistentState::Disconnected => *state = PersistentState::Connecting,
                PersistentState::Connecting | PersistentState::Connected => {
                    return Err(Error::Connection(
                        "session is already established".to_string(),
                    ));
                }
                PersistentState::Closed => {
                    return Err(Error::Connection(
                        "connection is closed and cannot be reused".to_string(),
                    ));
                }
            }
        }

        let handshake = tokio::time::timeout(
            self.config.heartbeat_timeout,
            self.transport
                .send(events::HELLO, self.config.handshake_payload.clone()),
        )
        .await;

        match handshake {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                Self::mark_closed(&self.state, &self.shutdown);
                return Err(Error::Connection(format!("handshake failed: {e}")));
            }
            Err(_) => {
                Self::mark_closed(&self.state, &self.shutdown);
                return Err(Error::Connection(format!(
                    "handshake timed out after {:?}",
                    self.config.heartbeat_timeout
                )));
            }
        }

        *self.state.lock() = PersistentState::Connected;
        tracing::debug!(
            interval = ?self.config.heartbeat_interval,
            timeout = ?self.config.heartbeat_timeout,
            "session established, starting heartbeat"
        );

        if let Some(messages) = self.messages.lock().take() {
            self.spawn_dispatch(messages);
        }
        self.spawn_heartbeat();

        Ok(())
    }

    /// Delivers server-pushed messages to registered listeners.
    ///
    /// A single reader task invokes handlers inline, which preserves arrival
    /// order across events.
    fn spawn_dispatch(&self, mut messages: mpsc::UnboundedReceiver<ServerMessage>) {
        let listeners = Arc::clone(&self.listeners);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    message = messages.recv() => {
                        let Some(message) = message else { break };
                        let handler = listeners.lock().get(&message.event).cloned();
                        match handler {
                            Some(handler) => handler(ServerReply::new(message.payload)),
                            None => tracing::debug!(
                                event = %message.event,
                                "message for event without listener (ignored)"
                            ),
                        }
                    }
                }
            }
        });
    }

    fn spawn_heartbeat(&self) {
        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let last_ping = Arc::clone(&self.last_ping);
        let shutdown = self.shutdown.clone();
        let interval = self.config.heartbeat_interval;
        let timeout = self.config.heartbeat_timeout;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // The server must have said something within the timeout
                // window; a silent peer is treated as gone even when the
                // wire itself still accepts writes.
                if let Some(received) = transport.last_message_received() {
                    if received.elapsed() > timeout {
                        tracing::warn!(
                            silent_for = ?received.elapsed(),
                            "server stopped sending messages, closing session"
                        );
                        Self::mark_closed(&state, &shutdown);
                        break;
                    }
                }

                *last_ping.lock() = Some(Instant::now());
                match tokio::time::timeout(timeout, transport.send(events::PING, Value::Null))
                    .await
                {
                    Ok(Ok(_pong)) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "heartbeat failed, closing session");
                        Self::mark_closed(&state, &shutdown);
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(deadline = ?timeout, "pong missed its deadline, closing session");
                        Self::mark_closed(&state, &shutdown);
                        break;
                    }
                }
            }
        });
    }
}

impl ServerConnection for PersistentServerConnection {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Persistent
    }

    fn is_closed(&self) -> bool {
        *self.state.lock() == PersistentState::Closed
    }

    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.connect_inner())
    }

    fn on(&self, event: &str, handler: ResponseHandler) -> Result<()> {
        self.listeners
            .lock()
            .insert(event.to_string(), Arc::from(handler));
        Ok(())
    }

    fn close(&self) {
        Self::mark_closed(&self.state, &self.shutdown);
    }
}

impl Drop for PersistentServerConnection {
    fn drop(&mut self) {
        // No heartbeat may fire after the owner lets go.
        self.shutdown.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassingState {
    Idle,
    Sent,
    Closed,
}

/// Connection scoped to exactly one request/response exchange.
///
/// `connect()` sends the handshake, captures the reply, and closes the
/// connection regardless of outcome. There is no heartbeat and no listener
/// delivery; the instance is never reusable.
pub struct PassingServerConnection {
    transport: Arc<dyn ServerTransport>,
    state: Mutex<PassingState>,
    reply: Mutex<Option<Value>>,
    config: ConnectionConfig,
}

impl PassingServerConnection {
    /// Creates a connection over a freshly dialed transport session.
    ///
    /// The inbound push channel of `parts` is dropped here: passing
    /// connections never deliver asynchronous events.
    pub fn new(parts: TransportParts, config: ConnectionConfig) -> Self {
        Self {
            transport: parts.transport,
            state: Mutex::new(PassingState::Idle),
            reply: Mutex::new(None),
            config,
        }
    }

    /// The reply captured by the single exchange, if it succeeded.
    pub fn reply(&self) -> Option<Value> {
        self.reply.lock().clone()
    }

    async fn connect_inner(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                PassingState::Idle => *state = PassingState::Sent,
                PassingState::Sent | PassingState::Closed => {
                    return Err(Error::Connection(
                        "a passing connection serves exactly one exchange".to_string(),
                    ));
                }
            }
        }

        let exchange = tokio::time::timeout(
            self.config.heartbeat_timeout,
            self.transport
                .send(events::HELLO, self.config.handshake_payload.clone()),
        )
        .await;

        let result = match exchange {
            Ok(Ok(reply)) => {
                *self.reply.lock() = Some(reply);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Connection(format!("exchange failed: {e}"))),
            Err(_) => Err(Error::Connection(format!(
                "exchange timed out after {:?}",
                self.config.heartbeat_timeout
            ))),
        };

        // Closed regardless of outcome.
        *self.state.lock() = PassingState::Closed;
        result
    }
}

impl std::fmt::Debug for PassingServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassingServerConnection").finish()
    }
}

impl ServerConnection for PassingServerConnection {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Passing
    }

    fn is_closed(&self) -> bool {
        *self.state.lock() == PassingState::Closed
    }

    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.connect_inner())
    }

    fn on(&self, _event: &str, _handler: ResponseHandler) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "passing connections do not support listeners",
        ))
    }

    fn close(&self) {
        *self.state.lock() = PassingState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, TransportPeer};
    use serde_json::json;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_millis(100),
            heartbeat_timeout: Duration::from_millis(100),
            handshake_payload: Value::Null,
        }
    }

    /// Answers the handshake, then `pongs` pings, then holds later pings
    /// unanswered so the pong deadline (not a transport error) is what
    /// closes the session.
    fn serve_session(mut peer: TransportPeer, pongs: usize) {
        tokio::spawn(async move {
            let Some(hello) = peer.next_request().await else {
                return;
            };
            assert_eq!(hello.event, events::HELLO);
            hello.respond(json!({"session": "ok"}));

            for _ in 0..pongs {
                match peer.next_request().await {
                    Some(ping) => {
                        assert_eq!(ping.event, events::PING);
                        ping.respond(json!("pong"));
                    }
                    None => return,
                }
            }

            let mut unanswered = Vec::new();
            while let Some(request) = peer.next_request().await {
                unanswered.push(request);
            }
        });
    }

    async fn wait_until_closed(connection: &dyn ServerConnection) {
        for _ in 0..100 {
            if connection.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("connection never closed");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_establishes_session_and_records_pings() {
        let (parts, peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());
        serve_session(peer, 3);

        connection.connect().await.unwrap();
        assert!(!connection.is_closed());
        assert_eq!(connection.connection_type(), ConnectionType::Persistent);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(connection.last_ping().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn missed_pong_closes_the_session() {
        let (parts, peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());
        serve_session(peer, 1);

        connection.connect().await.unwrap();
        assert!(!connection.is_closed());

        // The second ping is held unanswered; the deadline must kill the
        // session without any caller-visible error.
        wait_until_closed(&connection).await;
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_on_ping_closes_the_session() {
        let (parts, mut peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());

        tokio::spawn(async move {
            peer.next_request().await.unwrap().respond(json!({}));
            peer.next_request().await.unwrap().reject("gone");
            // Keep the wire open so only the rejection is observed.
            while peer.next_request().await.is_some() {}
        });

        connection.connect().await.unwrap();
        wait_until_closed(&connection).await;
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_failure_leaves_the_connection_closed() {
        let (parts, peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());
        drop(peer);

        let err = connection.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert!(connection.is_closed());

        // Closed is terminal: the same instance cannot reconnect.
        let err = connection.connect().await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeout_leaves_the_connection_closed() {
        let (parts, mut peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());

        let held = tokio::spawn(async move {
            // Never answer; keep the request alive so no error short-cuts
            // the timeout.
            let _hello = peer.next_request().await.unwrap();
            std::future::pending::<()>().await;
        });

        let err = connection.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert!(connection.is_closed());
        held.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn connect_twice_does_not_open_a_second_session() {
        let (parts, peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());
        serve_session(peer, 1000);

        connection.connect().await.unwrap();
        let err = connection.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert!(!connection.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_the_heartbeat_task() {
        let (parts, mut peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());

        let peer_task = tokio::spawn(async move {
            peer.next_request().await.unwrap().respond(json!({}));
            let ping = peer.next_request().await.unwrap();
            ping.respond(json!("pong"));
            peer
        });

        connection.connect().await.unwrap();
        let mut peer = peer_task.await.unwrap();

        connection.close();
        assert!(connection.is_closed());

        // No ping may fire after cancellation; the next one would have
        // arrived within a single interval.
        let quiet =
            tokio::time::timeout(Duration::from_millis(500), peer.next_request()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_connection_cancels_the_heartbeat_task() {
        let (parts, mut peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());

        let peer_task = tokio::spawn(async move {
            peer.next_request().await.unwrap().respond(json!({}));
            let ping = peer.next_request().await.unwrap();
            ping.respond(json!("pong"));
            peer
        });

        connection.connect().await.unwrap();
        let mut peer = peer_task.await.unwrap();

        drop(connection);

        // The wire may go away entirely once the owner is gone, but no
        // further ping may arrive either way.
        let quiet =
            tokio::time::timeout(Duration::from_millis(500), peer.next_request()).await;
        assert!(!matches!(quiet, Ok(Some(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn last_registration_wins_for_an_event() {
        let (parts, peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_a = Arc::clone(&seen);
        connection
            .on("msg", Box::new(move |_| seen_a.lock().push("a")))
            .unwrap();
        let seen_b = Arc::clone(&seen);
        connection
            .on("msg", Box::new(move |_| seen_b.lock().push("b")))
            .unwrap();

        let push_task = tokio::spawn(async move {
            let mut peer = peer;
            peer.next_request().await.unwrap().respond(json!({}));
            peer.push("msg", json!("payload"));
            // Hold the peer so the session stays alive long enough.
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(peer);
        });

        connection.connect().await.unwrap();
        push_task.await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*seen.lock(), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_fire_in_arrival_order_and_stay_independent() {
        let (parts, peer) = ChannelTransport::pair();
        let connection = PersistentServerConnection::new(parts, config());
        let seen: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));

        for event in ["alpha", "beta"] {
            let seen = Arc::clone(&seen);
            connection
                .on(
                    event,
                    Box::new(move |reply| seen.lock().push((event.to_string(), reply.data))),
                )
                .unwrap();
        }

        let push_task = tokio::spawn(async move {
            let mut peer = peer;
            peer.next_request().await.unwrap().respond(json!({}));
            peer.push("alpha", json!(1));
            peer.push("beta", json!(2));
            peer.push("alpha", json!(3));
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(peer);
        });

        connection.connect().await.unwrap();
        push_task.await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                ("alpha".to_string(), json!(1)),
                ("beta".to_string(), json!(2)),
                ("alpha".to_string(), json!(3)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn passing_performs_exactly_one_exchange() {
        let (parts, mut peer) = ChannelTransport::pair();
        let connection = PassingServerConnection::new(parts, config());
        assert!(!connection.is_closed());
        assert_eq!(connection.connection_type(), ConnectionType::Passing);

        let peer_task = tokio::spawn(async move {
            let hello = peer.next_request().await.unwrap();
            assert_eq!(hello.event, events::HELLO);
            hello.respond(json!({"data": 5}));
            peer
        });

        connection.connect().await.unwrap();
        assert!(connection.is_closed());
        assert_eq!(connection.reply().unwrap()["data"], 5);

        // Never reusable.
        let err = connection.connect().await.unwrap_err();
        assert!(err.is_connection());
        peer_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn passing_closes_even_when_the_exchange_fails() {
        let (parts, peer) = ChannelTransport::pair();
        let connection = PassingServerConnection::new(parts, config());
        drop(peer);

        let err = connection.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert!(connection.is_closed());
        assert!(connection.reply().is_none());
    }

    #[tokio::test]
    async fn passing_rejects_listeners() {
        let (parts, _peer) = ChannelTransport::pair();
        let connection = PassingServerConnection::new(parts, config());

        let err = connection
            .on("msg", Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
        // Rejection is static, not a state transition.
        assert!(!connection.is_closed());
    }
}
