//! Themelink Runtime - Connection lifecycle, heartbeat protocol, and
//! transport contract
//!
//! This crate provides the low-level runtime infrastructure for talking to a
//! theme server:
//!
//! - **Transport contract**: How a session moves messages, and the liveness
//!   timestamps every implementation must keep
//! - **Connection variants**: Persistent (heartbeat-maintained, listener
//!   delivery) and passing (single exchange, fire-and-close)
//! - **Heartbeat protocol**: The cancellable ping/pong loop that detects a
//!   dead peer and closes the session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  themelink  │  SDK facade, theme modules, factory hook
//! └──────┬──────┘
//!        │ creates connections
//! ┌──────▼──────┐
//! │   runtime   │  This crate
//! │  ┌────────┐ │
//! │  │ Conn   │ │  Lifecycle state machine + heartbeat
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Trans  │ │  Transport contract + loopback pair
//! │  └────────┘ │
//! └─────────────┘
//! ```
//!
//! # Decoupling via the transport contract
//!
//! Connections never open sockets themselves. A [`Dialer`] hands every new
//! connection its own [`TransportParts`]; the wire protocol behind it is
//! someone else's concern. This keeps the state machine testable against the
//! in-memory [`ChannelTransport`] pair with a virtual clock.

pub mod connection;
pub mod error;
pub mod transport;

// Re-export key types at crate root
pub use connection::{
    ConnectionConfig, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT,
    PassingServerConnection, PersistentServerConnection, ResponseHandler, ServerConnection,
};
pub use error::{Error, Result};
pub use transport::{
    BoxFuture, ChannelTransport, Dialer, PeerRequest, ServerTransport, TransportParts,
    TransportPeer, TransportTimestamps,
};

// Re-export the protocol types that appear in this crate's public API.
pub use themelink_protocol::{ConnectionType, ServerMessage, ServerReply, events};
