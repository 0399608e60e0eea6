mod common;

use common::{test_config, FakeTransport};
use mail_parser::{MessageParser, MimeHeaders};
use mailer_rs::{
    ContentKind, Email, ErrorKind, Mailer, MailerOptions, Provider, RetryPolicy, Settings,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn credentials() -> MailerOptions {
    MailerOptions::new()
        .email("test@gmail.com")
        .password("pass")
}

#[test]
fn test_missing_credentials_is_validation_error() {
    let err = Mailer::with_settings(MailerOptions::new(), &Settings::default()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), 400);
    assert!(err.message().contains("MAILER_EMAIL"));
    assert!(err.message().contains("MAILER_PASSWORD"));

    let err = Mailer::with_settings(
        MailerOptions::new().email("test@gmail.com"),
        &Settings::default(),
    )
    .unwrap_err();
    assert_eq!(err.code(), 400);
}

#[test]
fn test_unknown_provider_lists_supported() {
    let err = Mailer::with_settings(credentials().provider("aol"), &Settings::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), 400);
    assert!(err.message().contains("aol"));
    for name in Provider::SUPPORTED {
        assert!(err.message().contains(name));
    }
}

#[test]
fn test_defaults_to_gmail_and_ten_seconds() {
    let mailer = Mailer::with_settings(credentials(), &Settings::default()).unwrap();

    assert_eq!(mailer.provider(), Provider::Gmail);
    assert_eq!(mailer.endpoint().address(), "smtp.gmail.com:587");
    assert_eq!(mailer.timeout(), Duration::from_secs(10));
    assert!(!mailer.is_connected());
}

#[test]
fn test_explicit_options_win_over_fallback() {
    let fallback = Settings {
        email: Some("env@outlook.com".to_string()),
        password: Some("env-pass".to_string()),
        provider: Some("outlook".to_string()),
        timeout: Some(30),
        ..Settings::default()
    };

    let mailer = Mailer::with_settings(
        MailerOptions::new().email("arg@yahoo.com").provider("yahoo"),
        &fallback,
    )
    .unwrap();

    assert_eq!(mailer.email(), "arg@yahoo.com");
    assert_eq!(mailer.provider(), Provider::Yahoo);
    assert_eq!(mailer.endpoint().host, "smtp.mail.yahoo.com");
    assert_eq!(mailer.timeout(), Duration::from_secs(30));
    assert_eq!(mailer.config().password(), "env-pass");
}

#[test]
fn test_display_masks_credentials() {
    let mailer = FakeTransport::new().mailer();

    assert_eq!(
        mailer.to_string(),
        "Mailer(email=test****, provider=gmail, connected=false)"
    );
    assert!(!format!("{:?}", mailer).contains("\"pass\""));
}

#[tokio::test]
async fn test_connect_twice_opens_once() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();

    mailer.connect().await.unwrap();
    mailer.connect().await.unwrap();

    assert_eq!(transport.opens(), 1);
    assert!(mailer.is_connected());
    assert!(mailer.to_string().ends_with("connected=true)"));
}

#[tokio::test]
async fn test_rejected_credentials_is_auth_error() {
    let transport = FakeTransport::new().reject_auth(535);
    let mut mailer = transport.mailer();

    let err = mailer.connect().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(err.code(), 535);
    assert!(err.message().contains("App Password"));
    assert!(!mailer.is_connected());
}

#[tokio::test]
async fn test_unreachable_server_is_connect_error() {
    let transport = FakeTransport::new().unreachable();
    let mut mailer = transport.mailer();

    let err = mailer.connect().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connect);
    assert_eq!(err.code(), 500);
    assert!(err.message().contains("connection refused"));
}

#[tokio::test]
async fn test_disconnect_is_safe_to_repeat() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();

    mailer.disconnect().await;
    mailer.connect().await.unwrap();
    mailer.disconnect().await;
    mailer.disconnect().await;

    assert_eq!(transport.quits(), 1);
    assert!(!mailer.is_connected());
}

#[tokio::test]
async fn test_send_without_to_records_nothing() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let err = mailer.send(&Email::new("", "Hi", "Hello")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.code(), 400);

    let err = mailer
        .send(&Email::new(Vec::<String>::new(), "Hi", "Hello"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_line_break_in_address_records_nothing() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let emails = [
        Email::new("a@x.com>\r\nRCPT TO:<evil@x.com", "Hi", "Hello"),
        Email::new("a@x.com", "Hi", "Hello").cc(["c@x.com\r\nDATA"]),
        Email::new("a@x.com", "Hi", "Hello").bcc(["d@x.com\n"]),
    ];
    for email in &emails {
        let err = mailer.send(email).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), 400);
    }

    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_send_to_list() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let result = mailer
        .send(&Email::new(vec!["a@x.com", "b@x.com"], "Hi", "Hello"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.to, vec!["a@x.com", "b@x.com"]);
    assert!(result.error.is_none());

    let sent = transport.transmissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, "test@gmail.com");
    assert_eq!(sent[0].recipients, vec!["a@x.com", "b@x.com"]);
    assert!(sent[0].data.contains("To: a@x.com, b@x.com\r\n"));
}

#[tokio::test]
async fn test_cc_and_bcc_join_the_envelope() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let email = Email::new("a@x.com", "Hi", "Hello")
        .cc(["c@x.com"])
        .bcc(["d@x.com"]);
    let result = mailer.send(&email).await.unwrap();

    assert_eq!(result.to, vec!["a@x.com", "c@x.com", "d@x.com"]);

    let data = &transport.transmissions()[0].data;
    assert!(data.contains("Cc: c@x.com\r\n"));
    assert!(data.contains("Bcc: d@x.com\r\n"));
}

#[tokio::test]
async fn test_send_serializes_readable_message() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    mailer
        .send(&Email::new("friend@x.com", "Héllo wörld", "Plain body\nsecond line"))
        .await
        .unwrap();

    let data = transport.transmissions()[0].data.clone();
    let message = MessageParser::default().parse(data.as_bytes()).unwrap();

    assert_eq!(message.subject(), Some("Héllo wörld"));
    assert!(message.message_id().is_some());
    assert!(message.date().is_some());

    let text = message.body_text(0).unwrap();
    assert!(text.contains("Plain body"));
    assert!(text.contains("second line"));
}

#[tokio::test]
async fn test_send_while_disconnected_is_send_error() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();

    let err = mailer
        .send(&Email::new("friend@x.com", "Hi", "Hello"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Send);
    assert_eq!(err.code(), 500);
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_attachments_are_base64_parts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");
    std::fs::write(&path, b"id,total\n1,42\n").unwrap();

    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    mailer
        .send(&Email::new("friend@x.com", "Report", "See attached").attach(&path))
        .await
        .unwrap();

    let data = transport.transmissions()[0].data.clone();
    assert!(data.contains("Content-Type: application/octet-stream"));
    assert!(data.contains("Content-Disposition: attachment; filename=report.csv"));

    let message = MessageParser::default().parse(data.as_bytes()).unwrap();
    let attachment = message.attachments().next().unwrap();
    assert_eq!(attachment.attachment_name(), Some("report.csv"));
    assert_eq!(attachment.contents(), b"id,total\n1,42\n");
}

#[tokio::test]
async fn test_unreadable_attachment_is_send_error() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let err = mailer
        .send(&Email::new("friend@x.com", "Report", "See attached").attach(dir.path().join("missing.pdf")))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Send);
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_send_html_marks_content_type() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    mailer
        .send_html("friend@x.com", "Hi", "<h1>Hello</h1>")
        .await
        .unwrap();

    let data = &transport.transmissions()[0].data;
    assert!(data.contains("Content-Type: text/html"));
    assert!(data.contains("<h1>Hello</h1>"));
}

#[tokio::test]
async fn test_bulk_reports_each_recipient() {
    let transport = FakeTransport::new().reject_recipient("bad@x.com");
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let report = mailer
        .send_bulk(
            ["a@x.com", "bad@x.com", "c@x.com"],
            "News",
            "Hello",
            ContentKind::Plain,
        )
        .await;

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.total, 3);
    assert_eq!(transport.attempts(), 3);

    let recipients: Vec<&str> = report.details.iter().map(|d| d.recipient.as_str()).collect();
    assert_eq!(recipients, vec!["a@x.com", "bad@x.com", "c@x.com"]);
    assert!(report.details[0].success);
    assert!(!report.details[1].success);
    assert!(report.details[1]
        .error
        .as_deref()
        .unwrap()
        .contains("Recipient address rejected"));
    assert!(report.details[2].success);

    // One message per recipient
    for sent in transport.transmissions() {
        assert_eq!(sent.recipients.len(), 1);
    }
}

#[tokio::test]
async fn test_bulk_line_break_recipient_fails_alone() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let report = mailer
        .send_bulk(
            ["a@x.com", "b@x.com>\r\nRCPT TO:<evil@x.com", "c@x.com"],
            "News",
            "Hello",
            ContentKind::Plain,
        )
        .await;

    assert_eq!((report.sent, report.failed, report.total), (2, 1, 3));
    assert_eq!(transport.attempts(), 2);
    assert!(!report.details[1].success);
    assert!(report.details[1]
        .error
        .as_deref()
        .unwrap()
        .contains("line breaks"));
    for sent in transport.transmissions() {
        assert!(!sent.recipients.iter().any(|r| r.contains("evil")));
    }
}

#[tokio::test]
async fn test_bulk_html_and_empty_list() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let report = mailer
        .send_bulk(Vec::<String>::new(), "News", "Hello", ContentKind::Html)
        .await;
    assert_eq!((report.sent, report.failed, report.total), (0, 0, 0));

    let report = mailer
        .send_bulk(vec!["a@x.com".to_string()], "News", "<p>Hi</p>", ContentKind::Html)
        .await;
    assert_eq!(report.sent, 1);
    assert!(transport.transmissions()[0].data.contains("Content-Type: text/html"));
}

#[tokio::test]
async fn test_template_is_rendered_and_sent_as_html() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let result = mailer
        .send_template(
            "alice@x.com",
            "Your order",
            "Hello {{name}}, order #{{id}}",
            [("name", "Alice"), ("id", "42")],
        )
        .await
        .unwrap();
    assert!(result.success);

    let data = transport.transmissions()[0].data.clone();
    assert!(data.contains("Content-Type: text/html"));

    let message = MessageParser::default().parse(data.as_bytes()).unwrap();
    let html = message.body_html(0).unwrap();
    assert!(html.contains("Hello Alice, order #42"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_max_attempts_without_waiting() {
    let transport = FakeTransport::new().fail_sends(usize::MAX);
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let start = tokio::time::Instant::now();
    let result = mailer
        .send_with_retry(
            &Email::new("friend@x.com", "Hi", "Hello"),
            RetryPolicy::new(2, Duration::ZERO),
        )
        .await
        .unwrap();

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("Max retries (2) exceeded"));
    assert!(error.contains("Temporary server error"));
    assert_eq!(transport.attempts(), 2);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_retry_backoff_doubles_and_skips_final_wait() {
    let transport = FakeTransport::new().fail_sends(usize::MAX);
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let start = tokio::time::Instant::now();
    let result = mailer
        .send_with_retry(
            &Email::new("friend@x.com", "Hi", "Hello"),
            RetryPolicy::new(3, Duration::from_secs(1)),
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(transport.attempts(), 3);

    // 1s after the first failure, 2s after the second, nothing after the last
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_after_transient_failure() {
    let transport = FakeTransport::new().fail_sends(1);
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let result = mailer
        .send_with_retry(
            &Email::new("friend@x.com", "Hi", "Hello"),
            RetryPolicy::default(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.to, vec!["friend@x.com"]);
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test]
async fn test_retry_aborts_on_auth_failure() {
    let transport = FakeTransport::new().revoke_session();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let err = mailer
        .send_with_retry(
            &Email::new("friend@x.com", "Hi", "Hello"),
            RetryPolicy::new(3, Duration::ZERO),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(err.code(), 530);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn test_retry_aborts_on_validation_failure() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();
    mailer.connect().await.unwrap();

    let err = mailer
        .send_with_retry(&Email::new("", "Hi", "Hello"), RetryPolicy::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_scoped_disconnects_once_after_success() {
    let transport = FakeTransport::new();
    let mut mailer = transport.mailer();

    let email = Email::new("friend@x.com", "Hi", "Hello");
    let result = mailer
        .scoped(move |m| Box::pin(async move { m.send(&email).await }))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(transport.opens(), 1);
    assert_eq!(transport.quits(), 1);
    assert!(!mailer.is_connected());
}

#[tokio::test]
async fn test_scoped_disconnects_once_and_keeps_error() {
    let transport = FakeTransport::new().fail_sends(1);
    let mut mailer = transport.mailer();

    let email = Email::new("friend@x.com", "Hi", "Hello");
    let err = mailer
        .scoped(move |m| Box::pin(async move { m.send(&email).await }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Send);
    assert!(err.message().contains("Temporary server error"));
    assert_eq!(transport.quits(), 1);
    assert!(!mailer.is_connected());
}

#[tokio::test]
async fn test_scoped_skips_body_when_connect_fails() {
    let transport = FakeTransport::new().reject_auth(535);
    let mut mailer = transport.mailer();
    let ran = Arc::new(AtomicBool::new(false));

    let flag = ran.clone();
    let err = mailer
        .scoped(move |_| {
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(transport.quits(), 0);
}

#[tokio::test]
async fn test_with_connector_uses_given_config() {
    let transport = FakeTransport::new();
    let mailer = Mailer::with_connector(test_config(), Arc::new(transport.clone()));

    assert_eq!(mailer.email(), "test@gmail.com");
    assert_eq!(transport.opens(), 0);
}
