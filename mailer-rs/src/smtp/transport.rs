//! Transport seam between the session manager and the wire
//!
//! [`Connector`] opens an encrypted, authenticated session; [`Connection`]
//! carries messages over it. The SMTP implementation lives in
//! [`crate::smtp::client`].

use crate::provider::Endpoint;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failures raised below the session manager
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {timeout:?} connecting to {endpoint}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("SMTP protocol error: {0}")]
    Protocol(String),

    #[error("Server replied {code}: {message}")]
    Rejected { code: u16, message: String },

    #[error("Authentication rejected ({code}): {message}")]
    Auth { code: u16, message: String },

    #[error("Not connected")]
    NotConnected,
}

/// Everything needed to establish a session
#[derive(Clone)]
pub struct ConnectRequest {
    pub endpoint: Endpoint,
    pub timeout: Duration,
    pub ehlo_domain: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("ehlo_domain", &self.ehlo_domain)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Opens sessions: connect, greeting, STARTTLS, AUTH
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, request: &ConnectRequest) -> Result<Box<dyn Connection>, TransportError>;
}

/// An established, authenticated session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send {
    /// Run one mail transaction (MAIL FROM, RCPT TO per recipient, DATA)
    async fn send_mail(
        &mut self,
        from: &str,
        recipients: &[String],
        data: &str,
    ) -> Result<(), TransportError>;

    /// Terminate the session gracefully
    async fn quit(&mut self) -> Result<(), TransportError>;
}
