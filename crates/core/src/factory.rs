//! Construction hook applied to freshly created server connections.
//!
//! The SDK invokes the hook right after a connection variant is constructed
//! and before the facade stores it. Callers can wrap the instance in
//! decoration or substitute a test double without changing facade logic.
//! The hook is a plain function value passed at call time; there is no
//! mutable global default.

use std::sync::Arc;
use themelink_runtime::ServerConnection;

/// A factory that returns the connection itself instead of creating a new
/// one.
///
/// This is the default hook: identity passthrough. A hook returning `None`
/// tells the SDK that no connection was created.
pub fn self_connection_factory(
    connection: Arc<dyn ServerConnection>,
) -> Option<Arc<dyn ServerConnection>> {
    Some(connection)
}
