//! themelink: client SDK for theme modules and their server connections.
//!
//! This crate provides the public API for serving a theme module and keeping
//! it fresh over a server connection. A module is a named set of styling
//! variables; the connection to the theme server is either *persistent*
//! (long-lived, heartbeat-maintained, delivers server-pushed events) or
//! *passing* (a single exchange, closed immediately afterwards).
//!
//! # Examples
//!
//! ## Live theme updates over a persistent connection
//!
//! ```ignore
//! use std::sync::Arc;
//! use themelink::{ConnectionType, DynamicThemeModule, ThemeModule, Themelink};
//!
//! async fn run(dialer: Arc<dyn themelink::Dialer>) -> themelink::Result<()> {
//!     let module = ThemeModule::from(DynamicThemeModule::new("midnight"));
//!     let sdk = Themelink::new(module, dialer);
//!
//!     let connection = sdk
//!         .create_server_connection(ConnectionType::Persistent)
//!         .await?
//!         .expect("identity factory always yields a connection");
//!
//!     connection.on(
//!         "theme.updated",
//!         Box::new(|reply| println!("server pushed: {}", reply.data)),
//!     )?;
//!
//!     // The heartbeat keeps the session alive; a dead peer flips
//!     // `connection.is_closed()` and a new connection can be created.
//!     Ok(())
//! }
//! ```
//!
//! ## One-shot exchange over a passing connection
//!
//! ```ignore
//! use std::sync::Arc;
//! use themelink::{ConnectionType, PassingServerConnection, Themelink};
//!
//! async fn fetch_once(sdk: &Themelink) -> themelink::Result<()> {
//!     let connection = sdk
//!         .create_server_connection(ConnectionType::Passing)
//!         .await?
//!         .expect("identity factory always yields a connection");
//!
//!     // Closed by the time connect() returned; the reply is retained.
//!     let reply = connection
//!         .downcast_ref::<PassingServerConnection>()
//!         .and_then(PassingServerConnection::reply);
//!     println!("server answered: {reply:?}");
//!     Ok(())
//! }
//! ```

pub mod factory;
pub mod sdk;
pub mod theme;

pub use factory::self_connection_factory;
pub use sdk::Themelink;
pub use theme::{DynamicThemeModule, StaticThemeModule, ThemeModule};

// Re-export the protocol and runtime layers for convenience.
pub use themelink_protocol;
pub use themelink_runtime;

// Re-export the runtime types that appear in this crate's public API.
pub use themelink_runtime::{
    ConnectionConfig, ConnectionType, Dialer, Error, PassingServerConnection,
    PersistentServerConnection, ResponseHandler, Result, ServerConnection, ServerReply,
};
