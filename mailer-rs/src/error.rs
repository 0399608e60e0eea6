use std::fmt;
use thiserror::Error;

/// Status used for caller mistakes (missing credentials, unknown provider, no recipient)
pub const CODE_VALIDATION: u16 = 400;
/// SMTP "authentication credentials invalid" reply code
pub const CODE_AUTH_FAILED: u16 = 535;
/// Status used for connection and transmission failures
pub const CODE_INTERNAL: u16 = 500;

/// Errors surfaced by the mailer.
///
/// Every variant carries a numeric code (mirroring an SMTP status where one
/// applies) and a message preserving the underlying cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailerError {
    /// Caller supplied malformed or incomplete input
    #[error("[{code}] {message}")]
    Validation { code: u16, message: String },

    /// The server rejected the credentials
    #[error("[{code}] {message}")]
    Auth { code: u16, message: String },

    /// The session could not be established
    #[error("[{code}] {message}")]
    Connect { code: u16, message: String },

    /// The message could not be built or delivered
    #[error("[{code}] {message}")]
    Send { code: u16, message: String },
}

/// Category of a [`MailerError`], for branching without matching on fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Auth,
    Connect,
    Send,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::Connect => "connect",
            ErrorKind::Send => "send",
        };
        f.write_str(name)
    }
}

impl MailerError {
    pub fn validation(message: impl Into<String>) -> Self {
        MailerError::Validation {
            code: CODE_VALIDATION,
            message: message.into(),
        }
    }

    pub fn auth(code: u16, message: impl Into<String>) -> Self {
        MailerError::Auth {
            code,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        MailerError::Connect {
            code: CODE_INTERNAL,
            message: message.into(),
        }
    }

    pub fn send(message: impl Into<String>) -> Self {
        MailerError::Send {
            code: CODE_INTERNAL,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MailerError::Validation { .. } => ErrorKind::Validation,
            MailerError::Auth { .. } => ErrorKind::Auth,
            MailerError::Connect { .. } => ErrorKind::Connect,
            MailerError::Send { .. } => ErrorKind::Send,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            MailerError::Validation { code, .. }
            | MailerError::Auth { code, .. }
            | MailerError::Connect { code, .. }
            | MailerError::Send { code, .. } => *code,
        }
    }

    /// Message without the `[code]` prefix
    pub fn message(&self) -> &str {
        match self {
            MailerError::Validation { message, .. }
            | MailerError::Auth { message, .. }
            | MailerError::Connect { message, .. }
            | MailerError::Send { message, .. } => message,
        }
    }

    /// Only transmission failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Send
    }
}

pub type Result<T> = std::result::Result<T, MailerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = MailerError::validation("'to' address is required.");
        assert_eq!(err.to_string(), "[400] 'to' address is required.");
        assert_eq!(err.message(), "'to' address is required.");
    }

    #[test]
    fn test_constructors_set_codes() {
        assert_eq!(MailerError::validation("x").code(), 400);
        assert_eq!(MailerError::auth(535, "x").code(), 535);
        assert_eq!(MailerError::connect("x").code(), 500);
        assert_eq!(MailerError::send("x").code(), 500);
    }

    #[test]
    fn test_kind_and_retryable() {
        assert_eq!(MailerError::auth(535, "x").kind(), ErrorKind::Auth);
        assert!(MailerError::send("x").is_retryable());
        assert!(!MailerError::auth(535, "x").is_retryable());
        assert!(!MailerError::validation("x").is_retryable());
        assert!(!MailerError::connect("x").is_retryable());
    }
}
