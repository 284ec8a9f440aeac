//! Well-known event names of the themelink protocol.
//!
//! Event names are plain strings on the wire; the constants below are the
//! ones the runtime itself sends or expects. User-defined events share the
//! same namespace and are delivered verbatim to registered listeners.

/// Session handshake, sent exactly once by `connect()`.
pub const HELLO: &str = "hello";

/// Heartbeat probe sent by the client at a fixed interval.
///
/// The pong is the transport-level reply to this request, not a separate
/// event.
pub const PING: &str = "ping";
