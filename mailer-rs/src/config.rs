//! Client configuration
//!
//! Explicit arguments ([`MailerOptions`]) win over fallback [`Settings`],
//! which are read from a TOML file and/or `MAILER_*` environment variables.

use crate::error::{MailerError, Result};
use crate::provider::{Endpoint, Provider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Prefix of the fallback environment variables (`MAILER_EMAIL`, ...)
pub const ENV_PREFIX: &str = "MAILER";

/// Connection timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const MASK: &str = "****";

/// Fallback configuration source. Every field is optional.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Sender address
    pub email: Option<String>,
    /// App password
    pub password: Option<String>,
    /// Provider name (gmail, outlook, yahoo)
    pub provider: Option<String>,
    /// Connect timeout in seconds
    pub timeout: Option<u64>,
    /// Name announced in EHLO
    pub ehlo_domain: Option<String>,
    /// PEM bundle of extra trusted roots
    pub ca_cert_path: Option<PathBuf>,
}

impl Settings {
    /// Read `MAILER_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Same as [`Settings::from_env`] but reading from the given map
    pub fn from_env_map(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn from_environment(env: config::Environment) -> Result<Self> {
        config::Config::builder()
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MailerError::validation(format!("Invalid MAILER_* environment: {}", e)))
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MailerError::validation(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| MailerError::validation(format!("Failed to parse config: {}", e)))
    }

    /// Optional file overlaid by the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env = Self::from_env()?;
        match path {
            Some(path) => Ok(env.or(Self::from_file(path)?)),
            None => Ok(env),
        }
    }

    /// Fill fields missing from `self` with those of `fallback`
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            email: non_empty(self.email).or(fallback.email),
            password: non_empty(self.password).or(fallback.password),
            provider: non_empty(self.provider).or(fallback.provider),
            timeout: self.timeout.or(fallback.timeout),
            ehlo_domain: non_empty(self.ehlo_domain).or(fallback.ehlo_domain),
            ca_cert_path: self.ca_cert_path.or(fallback.ca_cert_path),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| MASK))
            .field("provider", &self.provider)
            .field("timeout", &self.timeout)
            .field("ehlo_domain", &self.ehlo_domain)
            .field("ca_cert_path", &self.ca_cert_path)
            .finish()
    }
}

/// Explicit construction arguments
#[derive(Clone, Default)]
pub struct MailerOptions {
    pub email: Option<String>,
    pub password: Option<String>,
    pub provider: Option<String>,
    pub timeout: Option<Duration>,
}

impl MailerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// True when no field needs a fallback value
    pub fn is_complete(&self) -> bool {
        [&self.email, &self.password, &self.provider]
            .iter()
            .all(|v| v.as_deref().is_some_and(|v| !v.trim().is_empty()))
            && self.timeout.is_some()
    }
}

/// Fallback settings for `options`, tolerating a broken environment when
/// the options leave nothing to fall back on
pub(crate) fn env_fallback(options: &MailerOptions, env: Result<Settings>) -> Result<Settings> {
    match env {
        Ok(settings) => Ok(settings),
        Err(e) if options.is_complete() => {
            warn!(error = %e, "Ignoring MAILER_* environment");
            Ok(Settings::default())
        }
        Err(e) => Err(e),
    }
}

/// Resolved, validated client configuration
#[derive(Clone)]
pub struct MailerConfig {
    pub email: String,
    password: String,
    pub provider: Provider,
    pub timeout: Duration,
    pub ehlo_domain: String,
    pub ca_cert_path: Option<PathBuf>,
}

impl MailerConfig {
    /// Apply explicit → fallback → default precedence and validate
    ///
    /// # Errors
    /// `Validation` (400) when the address or password is missing, or the
    /// provider is unknown.
    pub fn resolve(options: MailerOptions, fallback: &Settings) -> Result<Self> {
        let email = non_empty(options.email).or_else(|| non_empty(fallback.email.clone()));
        let password =
            non_empty(options.password).or_else(|| non_empty(fallback.password.clone()));

        let (email, password) = match (email, password) {
            (Some(email), Some(password)) => (email, password),
            _ => {
                return Err(MailerError::validation(format!(
                    "Email and password are required. \
                     Pass them directly or set {}_EMAIL and {}_PASSWORD env vars.",
                    ENV_PREFIX, ENV_PREFIX
                )))
            }
        };

        let provider = non_empty(options.provider)
            .or_else(|| non_empty(fallback.provider.clone()))
            .map(|name| Provider::lookup(&name))
            .transpose()?
            .unwrap_or_default();

        let timeout = options
            .timeout
            .or_else(|| fallback.timeout.map(Duration::from_secs))
            .unwrap_or(DEFAULT_TIMEOUT);

        let ehlo_domain = non_empty(fallback.ehlo_domain.clone()).unwrap_or_else(local_hostname);

        Ok(Self {
            email,
            password,
            provider,
            timeout,
            ehlo_domain,
            ca_cert_path: fallback.ca_cert_path.clone(),
        })
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn endpoint(&self) -> Endpoint {
        self.provider.endpoint()
    }

    /// Sender address with everything after the first four characters masked
    pub fn masked_email(&self) -> String {
        mask_address(&self.email)
    }
}

impl fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerConfig")
            .field("email", &self.masked_email())
            .field("password", &MASK)
            .field("provider", &self.provider)
            .field("timeout", &self.timeout)
            .field("ehlo_domain", &self.ehlo_domain)
            .field("ca_cert_path", &self.ca_cert_path)
            .finish()
    }
}

pub(crate) fn mask_address(address: &str) -> String {
    let prefix: String = address.chars().take(4).collect();
    format!("{}{}", prefix, MASK)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn local_hostname() -> String {
    let name = gethostname::gethostname().to_string_lossy().to_string();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name
    }
}
