//! Error types for the themelink runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the themelink runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A connection is already open for this SDK instance.
    #[error("There is already an open connection for this module.")]
    AlreadyConnected,

    /// The requested connection type has no handler.
    #[error("Unhandled server connection type: {0}")]
    UnsupportedConnectionType(String),

    /// The operation is not supported by this implementation.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Failed to establish or maintain a session with the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport-level error (wire communication).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Channel closed unexpectedly.
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl Error {
    /// Returns true if this error reports an unsupported operation or
    /// connection type.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedOperation(_) | Error::UnsupportedConnectionType(_)
        )
    }

    /// Returns true if this is a connection-establishment failure.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}
