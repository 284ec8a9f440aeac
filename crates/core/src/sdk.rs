// Copyright 2024 Paul Adamson
// Licensed under the Apache License, Version 2.0

//! SDK facade: one theme module, at most one open server connection.
//!
//! [`Themelink`] pairs the theme module it serves with the server connection
//! keeping that module fresh. The facade enforces a single invariant: at
//! most one connection is current at a time, and a new one may only be
//! created once the previous one is closed. Creation dispatches on the
//! requested [`ConnectionType`], funnels the fresh instance through the
//! caller-supplied factory hook, stores it, and connects it.

use crate::factory::self_connection_factory;
use crate::theme::ThemeModule;
use parking_lot::Mutex;
use std::sync::Arc;
use themelink_runtime::{
    ConnectionConfig, ConnectionType, Dialer, Error, PassingServerConnection,
    PersistentServerConnection, Result, ServerConnection,
};

/// Client entry point pairing a theme module with its server connection.
pub struct Themelink {
    module: ThemeModule,
    dialer: Arc<dyn Dialer>,
    config: ConnectionConfig,
    connection: Mutex<Option<Arc<dyn ServerConnection>>>,
}

impl Themelink {
    /// Creates an SDK instance serving `module`, dialing the server through
    /// `dialer` with default connection timing.
    pub fn new(module: ThemeModule, dialer: Arc<dyn Dialer>) -> Self {
        Self::with_config(module, dialer, ConnectionConfig::default())
    }

    /// Creates an SDK instance with explicit connection timing.
    pub fn with_config(
        module: ThemeModule,
        dialer: Arc<dyn Dialer>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            module,
            dialer,
            config,
            connection: Mutex::new(None),
        }
    }

    /// Returns the module this SDK instance serves.
    pub fn current_module(&self) -> &ThemeModule {
        &self.module
    }

    /// Mutable access to the module, for dynamic variable updates.
    pub fn current_module_mut(&mut self) -> &mut ThemeModule {
        &mut self.module
    }

    /// Returns the most recently created connection, if any.
    pub fn server_connection(&self) -> Option<Arc<dyn ServerConnection>> {
        self.connection.lock().clone()
    }

    /// Creates and connects a server connection of the given type.
    ///
    /// Shorthand for [`Self::create_server_connection_with`] using the
    /// identity factory.
    pub async fn create_server_connection(
        &self,
        connection_type: ConnectionType,
    ) -> Result<Option<Arc<dyn ServerConnection>>> {
        self.create_server_connection_with(connection_type, self_connection_factory)
            .await
    }

    /// Creates a server connection of the given type, passing it through
    /// `factory` before storing and connecting it.
    ///
    /// The factory may return the connection unchanged, substitute a
    /// wrapped or mock instance, or return `None` to signal that no
    /// connection was created (nothing is stored and `Ok(None)` is
    /// returned).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] when a previously created connection
    ///   exists and is not yet closed
    /// - [`Error::UnsupportedConnectionType`] for a type tag without a
    ///   matching variant
    /// - [`Error::Connection`] when the handshake fails; the failed
    ///   connection stays in the slot, closed and hence replaceable
    pub async fn create_server_connection_with<F>(
        &self,
        connection_type: ConnectionType,
        factory: F,
    ) -> Result<Option<Arc<dyn ServerConnection>>>
    where
        F: FnOnce(Arc<dyn ServerConnection>) -> Option<Arc<dyn ServerConnection>>,
    {
        if let Some(existing) = self.server_connection() {
            if !existing.is_closed() {
                return Err(Error::AlreadyConnected);
            }
        }

        tracing::debug!(%connection_type, "creating server connection");
        let parts = self.dialer.dial().await?;

        let connection: Arc<dyn ServerConnection> = match connection_type {
            ConnectionType::Persistent => {
                Arc::new(PersistentServerConnection::new(parts, self.config.clone()))
            }
            ConnectionType::Passing => {
                Arc::new(PassingServerConnection::new(parts, self.config.clone()))
            }
            ConnectionType::Unknown => {
                return Err(Error::UnsupportedConnectionType(
                    connection_type.to_string(),
                ));
            }
        };

        let Some(connection) = factory(connection) else {
            tracing::debug!("connection factory produced no connection");
            return Ok(None);
        };

        // Store before connecting: a failed handshake leaves a closed
        // connection in the slot, which the next create replaces.
        *self.connection.lock() = Some(Arc::clone(&connection));
        connection.connect().await?;

        Ok(Some(connection))
    }
}
