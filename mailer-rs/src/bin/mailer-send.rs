//! Send one message from the command line
//!
//! Credentials come from `MAILER_EMAIL` / `MAILER_PASSWORD` or from the
//! `--config` TOML file.
//!
//! # Usage
//!
//! ```bash
//! # Plain text
//! mailer-send --to friend@example.com --subject "Hi" --body "Hello!"
//!
//! # HTML from a file, with an attachment and two retries
//! mailer-send --to a@example.com --to b@example.com --subject "Report" \
//!     --body-file report.html --html --attach report.pdf --retries 2
//! ```

use anyhow::Context;
use clap::Parser;
use mailer_rs::{Email, Mailer, MailerOptions, RetryPolicy, Settings};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mailer-send")]
#[command(about = "Send an email through Gmail, Outlook or Yahoo", long_about = None)]
struct Cli {
    /// Recipient address (repeat for several)
    #[arg(long, required = true)]
    to: Vec<String>,

    /// Subject line
    #[arg(short, long)]
    subject: String,

    /// Message body
    #[arg(short, long, conflicts_with = "body_file", required_unless_present = "body_file")]
    body: Option<String>,

    /// Read the message body from a file
    #[arg(long)]
    body_file: Option<PathBuf>,

    /// Send the body as HTML
    #[arg(long)]
    html: bool,

    #[arg(long)]
    cc: Vec<String>,

    #[arg(long)]
    bcc: Vec<String>,

    /// File to attach (repeat for several)
    #[arg(long)]
    attach: Vec<PathBuf>,

    /// gmail, outlook or yahoo
    #[arg(short, long)]
    provider: Option<String>,

    /// Attempts before giving up
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Delay after the first failed attempt, doubled each time
    #[arg(long, default_value_t = 1)]
    backoff_secs: u64,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailer_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    let mut options = MailerOptions::new();
    if let Some(provider) = &cli.provider {
        options = options.provider(provider.as_str());
    }

    let body = match (&cli.body, &cli.body_file) {
        (Some(body), _) => body.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read body from {}", path.display()))?,
        (None, None) => String::new(),
    };

    let mut email = Email::new(cli.to, cli.subject, body)
        .cc(cli.cc)
        .bcc(cli.bcc);
    if cli.html {
        email = email.html();
    }
    for path in cli.attach {
        email = email.attach(path);
    }

    let policy = RetryPolicy::new(cli.retries, Duration::from_secs(cli.backoff_secs));

    let outcome = match Mailer::with_settings(options, &settings) {
        Ok(mut mailer) => {
            info!("Using {}", mailer);
            mailer
                .scoped(move |m| Box::pin(async move { m.send_with_retry(&email, policy).await }))
                .await
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("{}", e);
            println!(
                "{}",
                serde_json::json!({
                    "success": false,
                    "error": e.message(),
                    "code": e.code(),
                    "kind": e.kind().to_string(),
                })
            );
            std::process::exit(1);
        }
    }

    Ok(())
}
