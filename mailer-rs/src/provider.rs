//! Known submission endpoints
//!
//! The table is fixed at compile time; lookups are pure.

use crate::error::{MailerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// STARTTLS submission port (RFC 6409)
pub const SUBMISSION_PORT: u16 = 587;

/// Host and port accepting authenticated mail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Supported mail providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gmail,
    Outlook,
    Yahoo,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Gmail, Provider::Outlook, Provider::Yahoo];

    /// Names accepted by [`Provider::lookup`]
    pub const SUPPORTED: [&'static str; 3] = ["gmail", "outlook", "yahoo"];

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Outlook => "outlook",
            Provider::Yahoo => "yahoo",
        }
    }

    fn host(&self) -> &'static str {
        match self {
            Provider::Gmail => "smtp.gmail.com",
            Provider::Outlook => "smtp.office365.com",
            Provider::Yahoo => "smtp.mail.yahoo.com",
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host(), SUBMISSION_PORT)
    }

    /// Resolve a provider by name
    ///
    /// # Errors
    /// `Validation` (400) listing the supported names when `name` is unknown.
    pub fn lookup(name: &str) -> Result<Provider> {
        Provider::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| {
                MailerError::validation(format!(
                    "Unknown provider '{}'. Supported: {:?}",
                    name,
                    Provider::SUPPORTED
                ))
            })
    }
}

impl FromStr for Provider {
    type Err = MailerError;

    fn from_str(s: &str) -> Result<Self> {
        Provider::lookup(s)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
