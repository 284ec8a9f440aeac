//! Core protocol types used across the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection strategy tag.
///
/// Identifies which lifecycle a server connection follows. The tags travel
/// on the wire during the handshake, so their spelling is part of the
/// protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Long-lived session kept alive with ping/pong heartbeats.
    Persistent,
    /// Single request/response exchange, closed immediately afterwards.
    Passing,
    /// Placeholder for a type tag this client does not recognize.
    Unknown,
}

impl ConnectionType {
    /// Returns the wire tag for this connection type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Persistent => "persistent",
            ConnectionType::Passing => "passing",
            ConnectionType::Unknown => "unknown",
        }
    }

    /// Parses a wire tag. Unrecognized tags map to [`ConnectionType::Unknown`]
    /// so that newer servers remain identifiable without failing the parse.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "persistent" => ConnectionType::Persistent,
            "passing" => ConnectionType::Passing,
            _ => ConnectionType::Unknown,
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asynchronous message pushed by the server to the client.
///
/// Persistent connections receive these outside of any request/response
/// pair and route them to the listener registered for `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Event name the message belongs to.
    pub event: String,
    /// Message body as supplied by the server.
    pub payload: Value,
}

impl ServerMessage {
    /// Creates a message for the given event name and payload.
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Envelope handed to event listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerReply<T = Value> {
    /// The content of the response received from the server.
    pub data: T,
}

impl<T> ServerReply<T> {
    /// Wraps a response body in the listener envelope.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
