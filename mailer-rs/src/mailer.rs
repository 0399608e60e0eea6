//! The mail client
//!
//! A [`Mailer`] owns one configuration and at most one SMTP session. Every
//! helper (`send_html`, `send_bulk`, `send_template`, `send_with_retry`) is
//! built on [`Mailer::send`].

use crate::config::{env_fallback, mask_address, MailerConfig, MailerOptions, Settings};
use crate::error::{MailerError, Result};
use crate::message::{build_message, ContentKind, Email, Recipients};
use crate::provider::{Endpoint, Provider};
use crate::smtp::{ConnectRequest, Connector, Session, SmtpConnector, TransportError};
use crate::template::{placeholders, render_template};
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of a single send, or of an exhausted retry loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResult {
    pub success: bool,
    /// Envelope recipients (`to`, then `cc`, then `bcc`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(to: Vec<String>) -> Self {
        Self {
            success: true,
            to,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            to: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Per-recipient outcome of a bulk send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkDetail {
    pub recipient: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate of a bulk send; `sent + failed == total`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    pub details: Vec<BulkDetail>,
}

/// Attempt budget and base delay for [`Mailer::send_with_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay after the first failure; doubles on each following one
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// `backoff * 2^attempt` (attempt is zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// SMTP mail client for Gmail, Outlook and Yahoo
///
/// # Examples
/// ```no_run
/// use mailer_rs::{Email, Mailer, MailerOptions};
///
/// # async fn example() -> mailer_rs::Result<()> {
/// let mut mailer = Mailer::new(
///     MailerOptions::new()
///         .email("you@gmail.com")
///         .password("app-password"),
/// )?;
///
/// let email = Email::new("friend@example.com", "Hi", "Hello!");
/// mailer
///     .scoped(move |m| Box::pin(async move { m.send(&email).await }))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Mailer {
    config: MailerConfig,
    session: Session,
}

impl Mailer {
    /// Build a client, falling back to `MAILER_*` environment variables
    ///
    /// A malformed environment is only an error when some option is left
    /// to it; with email, password, provider and timeout all given it is
    /// ignored.
    ///
    /// # Errors
    /// `Validation` (400) for missing credentials, an unknown provider or an
    /// unreadable environment that is actually needed.
    pub fn new(options: MailerOptions) -> Result<Self> {
        let fallback = env_fallback(&options, Settings::from_env())?;
        Self::with_settings(options, &fallback)
    }

    /// Build a client entirely from `MAILER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(MailerOptions::new())
    }

    /// Build a client with an explicit fallback source
    pub fn with_settings(options: MailerOptions, fallback: &Settings) -> Result<Self> {
        Self::from_config(MailerConfig::resolve(options, fallback)?)
    }

    /// Build a client speaking SMTP to the configured provider
    pub fn from_config(config: MailerConfig) -> Result<Self> {
        let connector = match &config.ca_cert_path {
            Some(path) => SmtpConnector::with_ca_file(path),
            None => SmtpConnector::new(),
        }
        .map_err(|e| MailerError::validation(e.to_string()))?;

        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Build a client on top of any transport
    pub fn with_connector(config: MailerConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            session: Session::new(connector),
        }
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    pub fn email(&self) -> &str {
        &self.config.email
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn endpoint(&self) -> Endpoint {
        self.config.endpoint()
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Open and authenticate the session; a no-op when already connected
    ///
    /// # Errors
    /// - `Auth` when the credentials are rejected
    /// - `Connect` when the server cannot be reached or the handshake fails
    pub async fn connect(&mut self) -> Result<&mut Self> {
        let request = ConnectRequest {
            endpoint: self.config.endpoint(),
            timeout: self.config.timeout,
            ehlo_domain: self.config.ehlo_domain.clone(),
            username: self.config.email.clone(),
            password: self.config.password().to_string(),
        };
        self.session.connect(&request).await?;
        Ok(self)
    }

    /// Close the session; never fails
    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
    }

    /// Connect, run `f`, then disconnect whatever `f` returned
    ///
    /// The error from `f`, if any, is returned unchanged. When connecting
    /// fails `f` is not run.
    pub async fn scoped<T, F>(&mut self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Mailer) -> BoxFuture<'a, Result<T>>,
    {
        self.connect().await?;
        let outcome = f(&mut *self).await;
        self.disconnect().await;
        outcome
    }

    /// Send one message over the open session
    ///
    /// # Errors
    /// - `Validation` when `to` is missing, before anything is built or sent
    /// - `Auth` when the server demands authentication again mid-session
    /// - `Send` when an attachment cannot be read or the transaction fails
    pub async fn send(&mut self, email: &Email) -> Result<SendResult> {
        email.validate()?;

        match self.deliver(email).await {
            Ok(recipients) => {
                info!("Email sent to: {:?}", recipients);
                Ok(SendResult::delivered(recipients))
            }
            Err(e) => {
                error!("Send failed: {}", e.message());
                Err(e)
            }
        }
    }

    async fn deliver(&mut self, email: &Email) -> Result<Vec<String>> {
        let message = build_message(&self.config.email, email)
            .await
            .map_err(|e| MailerError::send(format!("Failed to read attachment: {}", e)))?;

        self.session
            .transmit(&message)
            .await
            .map_err(|e| match e {
                TransportError::Auth { code, message } => MailerError::auth(
                    code,
                    format!(
                        "Authentication failed. Check your App Password. Detail: {}",
                        message
                    ),
                ),
                other => MailerError::send(other.to_string()),
            })?;

        Ok(message.recipients)
    }

    /// Send an HTML body
    pub async fn send_html(
        &mut self,
        to: impl Into<Recipients>,
        subject: &str,
        body: &str,
    ) -> Result<SendResult> {
        self.send(&Email::new(to, subject, body).html()).await
    }

    /// Send the same content to each recipient as a separate message
    ///
    /// A failure for one recipient is recorded and the rest are still tried.
    pub async fn send_bulk<I, S>(
        &mut self,
        recipients: I,
        subject: &str,
        body: &str,
        kind: ContentKind,
    ) -> BulkReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut details = Vec::new();

        for recipient in recipients {
            let recipient = recipient.into();
            let email = Email::new(recipient.as_str(), subject, body).kind(kind);

            match self.send(&email).await {
                Ok(_) => details.push(BulkDetail {
                    recipient,
                    success: true,
                    error: None,
                }),
                Err(e) => {
                    warn!("Bulk send failed for {}: {}", recipient, e.message());
                    details.push(BulkDetail {
                        recipient,
                        success: false,
                        error: Some(e.message().to_string()),
                    });
                }
            }
        }

        let total = details.len();
        let sent = details.iter().filter(|d| d.success).count();
        info!("Bulk send complete: {}/{} sent", sent, total);

        BulkReport {
            sent,
            failed: total - sent,
            total,
            details,
        }
    }

    /// Render `{{key}}` placeholders from `context` and send the result as HTML
    pub async fn send_template<I, K, V>(
        &mut self,
        to: impl Into<Recipients>,
        subject: &str,
        template: &str,
        context: I,
    ) -> Result<SendResult>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        let body = render_template(template, context);

        let unmatched = placeholders(&body);
        if !unmatched.is_empty() {
            debug!("Template placeholders left unfilled: {:?}", unmatched);
        }

        self.send_html(to, subject, &body).await
    }

    /// Send, retrying transmission failures with exponential backoff
    ///
    /// `Auth` and every other non-`Send` error abort on first occurrence.
    /// Exhausting the attempts is not an error: the returned result has
    /// `success == false` and the last failure in `error`.
    pub async fn send_with_retry(
        &mut self,
        email: &Email,
        policy: RetryPolicy,
    ) -> Result<SendResult> {
        if policy.max_retries == 0 {
            return Err(MailerError::validation("max_retries must be at least 1."));
        }

        let mut last_error = None;

        for attempt in 0..policy.max_retries {
            match self.send(email).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => {
                    let wait = policy.delay(attempt);
                    let remaining = attempt + 1 < policy.max_retries;

                    if remaining {
                        warn!(
                            "Attempt {}/{} failed. Retrying in {:?}... ({})",
                            attempt + 1,
                            policy.max_retries,
                            wait,
                            e.message()
                        );
                    } else {
                        warn!(
                            "Attempt {}/{} failed. ({})",
                            attempt + 1,
                            policy.max_retries,
                            e.message()
                        );
                    }
                    last_error = Some(e);

                    if remaining && !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let detail = last_error
            .map(|e| e.message().to_string())
            .unwrap_or_default();

        Ok(SendResult::failed(format!(
            "Max retries ({}) exceeded. Last error: {}",
            policy.max_retries, detail
        )))
    }
}

impl fmt::Display for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mailer(email={}, provider={}, connected={})",
            mask_address(&self.config.email),
            self.config.provider,
            self.is_connected()
        )
    }
}

impl fmt::Debug for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}
