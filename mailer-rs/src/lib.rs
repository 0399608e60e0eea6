//! mailer-rs: SMTP client for consumer mail providers
//!
//! Sends mail through Gmail, Outlook or Yahoo over authenticated,
//! STARTTLS-protected SMTP submission (port 587).
//!
//! # Features
//!
//! - **Providers**: built-in endpoints for `gmail`, `outlook` and `yahoo`
//! - **Messages**: plain text or HTML, Cc/Bcc, file attachments
//! - **Helpers**: bulk sends with per-recipient reports, `{{placeholder}}`
//!   templates, exponential-backoff retry
//! - **Configuration**: explicit options, `MAILER_*` environment variables,
//!   TOML files
//!
//! # Example
//!
//! ```no_run
//! use mailer_rs::{Email, Mailer, MailerOptions, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut mailer = Mailer::new(
//!         MailerOptions::new()
//!             .email("you@gmail.com")
//!             .password("app-password")
//!             .provider("gmail"),
//!     )?;
//!
//!     mailer.connect().await?;
//!     let email = Email::new("friend@example.com", "Hi", "<b>Hello!</b>").html();
//!     let result = mailer.send_with_retry(&email, RetryPolicy::default()).await?;
//!     mailer.disconnect().await;
//!
//!     println!("sent: {}", result.success);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Option resolution, environment and file settings
//! - [`error`]: Error types and codes
//! - [`mailer`]: The client and its send helpers
//! - [`message`]: Messages and MIME serialization
//! - [`provider`]: Provider registry
//! - [`smtp`]: SMTP submission transport
//! - [`template`]: Placeholder rendering

pub mod config;
pub mod error;
pub mod mailer;
pub mod message;
pub mod provider;
pub mod smtp;
pub mod template;

// Re-export commonly used types
pub use config::{MailerConfig, MailerOptions, Settings};
pub use error::{ErrorKind, MailerError, Result};
pub use mailer::{BulkDetail, BulkReport, Mailer, RetryPolicy, SendResult};
pub use message::{Attachment, ContentKind, Email, Recipients};
pub use provider::{Endpoint, Provider};
pub use template::{placeholders, render_template};
