//! Session lifecycle: one optional connection per client
//!
//! `connect` is idempotent, `disconnect` never fails.

use crate::error::{MailerError, Result};
use crate::message::SerializedMessage;
use crate::smtp::transport::{ConnectRequest, Connection, Connector, TransportError};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns at most one live connection
pub struct Session {
    connector: Arc<dyn Connector>,
    connection: Option<Box<dyn Connection>>,
}

impl Session {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Open and authenticate a connection unless one is already open
    ///
    /// # Errors
    /// - `Auth` when the server rejects the credentials
    /// - `Connect` for every other failure (unreachable, timeout, TLS, protocol)
    pub async fn connect(&mut self, request: &ConnectRequest) -> Result<()> {
        if self.connection.is_some() {
            debug!("Already connected to {}", request.endpoint);
            return Ok(());
        }

        info!("Connecting to {} ...", request.endpoint);
        let connection = self
            .connector
            .open(request)
            .await
            .map_err(|e| match e {
                TransportError::Auth { code, message } => MailerError::auth(
                    code,
                    format!(
                        "Authentication failed. Check your App Password. Detail: {}",
                        message
                    ),
                ),
                other => MailerError::connect(format!(
                    "Could not connect to {}. Detail: {}",
                    request.endpoint, other
                )),
            })?;

        self.connection = Some(connection);
        info!("Connected and authenticated: {}", request.endpoint.host);
        Ok(())
    }

    /// Hand a serialized message to the open connection
    pub async fn transmit(
        &mut self,
        message: &SerializedMessage,
    ) -> std::result::Result<(), TransportError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;

        connection
            .send_mail(&message.from, &message.recipients, &message.data)
            .await
    }

    /// Best-effort QUIT; the connection is released whatever happens
    pub async fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            match connection.quit().await {
                Ok(()) => info!("Disconnected"),
                Err(e) => debug!("Ignoring error during QUIT: {}", e),
            }
        }
    }
}
