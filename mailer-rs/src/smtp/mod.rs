//! SMTP submission (RFC 5321 / RFC 6409)
//!
//! - [`transport`]: the `Connector` / `Connection` seam and its error type
//! - [`client`]: STARTTLS + AUTH client implementing that seam
//! - [`tls`]: rustls client configuration
//! - [`session`]: single-connection lifecycle used by the mailer

pub mod client;
pub mod session;
pub mod tls;
pub mod transport;

pub use client::{SmtpConnection, SmtpConnector};
pub use session::Session;
pub use transport::{ConnectRequest, Connection, Connector, TransportError};
