//! Outbound message model and MIME serialization
//!
//! Messages are always `multipart/mixed`: one body part (text/plain or
//! text/html) followed by zero or more base64 attachment parts.

use crate::error::{MailerError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};

const BASE64_LINE: usize = 76;
const MAX_7BIT_LINE: usize = 998;

/// Body content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    #[default]
    Plain,
    Html,
}

impl ContentKind {
    pub fn from_html_flag(html: bool) -> Self {
        if html {
            ContentKind::Html
        } else {
            ContentKind::Plain
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentKind::Plain => "text/plain",
            ContentKind::Html => "text/html",
        }
    }
}

/// One or more `To` addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients(Vec<String>);

impl Recipients {
    /// At least one address and no blank entries
    pub fn is_present(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|a| !a.trim().is_empty())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for Recipients {
    fn from(address: &str) -> Self {
        Recipients(vec![address.to_string()])
    }
}

impl From<String> for Recipients {
    fn from(address: String) -> Self {
        Recipients(vec![address])
    }
}

impl From<&String> for Recipients {
    fn from(address: &String) -> Self {
        Recipients(vec![address.clone()])
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addresses: Vec<String>) -> Self {
        Recipients(addresses)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addresses: Vec<&str>) -> Self {
        addresses.into_iter().map(String::from).collect()
    }
}

impl From<&[&str]> for Recipients {
    fn from(addresses: &[&str]) -> Self {
        addresses.iter().map(|a| a.to_string()).collect()
    }
}

impl<const N: usize> From<[&str; N]> for Recipients {
    fn from(addresses: [&str; N]) -> Self {
        addresses.iter().map(|a| a.to_string()).collect()
    }
}

impl FromIterator<String> for Recipients {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Recipients(iter.into_iter().collect())
    }
}

/// A message to send
#[derive(Debug, Clone)]
pub struct Email {
    pub to: Recipients,
    pub subject: String,
    pub body: String,
    pub kind: ContentKind,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub attachments: Vec<PathBuf>,
}

impl Email {
    pub fn new(
        to: impl Into<Recipients>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            kind: ContentKind::Plain,
            cc: Vec::new(),
            bcc: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Mark the body as HTML
    pub fn html(self) -> Self {
        self.kind(ContentKind::Html)
    }

    pub fn kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn cc<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cc.extend(addresses.into_iter().map(Into::into));
        self
    }

    pub fn bcc<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bcc.extend(addresses.into_iter().map(Into::into));
        self
    }

    pub fn attach(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Envelope recipients: `to`, then `cc`, then `bcc`. Duplicates are kept.
    pub fn recipients(&self) -> Vec<String> {
        self.to
            .as_slice()
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .cloned()
            .collect()
    }

    /// Reject messages without a `To` address, or with an address that
    /// spans more than one line
    pub fn validate(&self) -> Result<()> {
        if !self.to.is_present() {
            return Err(MailerError::validation("'to' address is required."));
        }
        if let Some(address) = self
            .recipients()
            .into_iter()
            .find(|a| a.contains(['\r', '\n']))
        {
            return Err(MailerError::validation(format!(
                "Invalid address {:?}: line breaks are not allowed.",
                address
            )));
        }
        Ok(())
    }
}

/// File content attached to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }

    /// Read a file; the attachment is named after its base name
    pub async fn from_path(path: &Path) -> io::Result<Self> {
        let content = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self { filename, content })
    }
}

/// Envelope plus RFC 5322 text, ready for DATA
#[derive(Debug, Clone)]
pub struct SerializedMessage {
    pub from: String,
    pub recipients: Vec<String>,
    pub data: String,
}

/// Load attachments from disk and serialize `email`
pub async fn build_message(from: &str, email: &Email) -> io::Result<SerializedMessage> {
    let mut attachments = Vec::with_capacity(email.attachments.len());
    for path in &email.attachments {
        attachments.push(Attachment::from_path(path).await?);
    }
    Ok(compose(from, email, &attachments))
}

/// Serialize `email` with already-loaded attachments
pub fn compose(from: &str, email: &Email, attachments: &[Attachment]) -> SerializedMessage {
    let boundary = format!("----=_Part_{}", uuid::Uuid::new_v4().simple());
    let mut data = String::new();

    push_header(&mut data, "From", from);
    push_header(&mut data, "To", &email.to.as_slice().join(", "));
    if !email.cc.is_empty() {
        push_header(&mut data, "Cc", &email.cc.join(", "));
    }
    if !email.bcc.is_empty() {
        push_header(&mut data, "Bcc", &email.bcc.join(", "));
    }
    push_header(&mut data, "Subject", &encode_header_value(&email.subject));
    push_header(&mut data, "Date", &Utc::now().to_rfc2822());
    push_header(&mut data, "Message-ID", &message_id(from));
    push_header(&mut data, "MIME-Version", "1.0");
    push_header(
        &mut data,
        "Content-Type",
        &format!("multipart/mixed; boundary=\"{}\"", boundary),
    );
    data.push_str("\r\n");

    data.push_str(&format!("--{}\r\n", boundary));
    push_body_part(&mut data, email.kind, &email.body);

    for attachment in attachments {
        data.push_str(&format!("--{}\r\n", boundary));
        push_attachment_part(&mut data, attachment);
    }

    data.push_str(&format!("--{}--\r\n", boundary));

    SerializedMessage {
        from: from.to_string(),
        recipients: email.recipients(),
        data,
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    // CR/LF in a value would start a new header
    let value: String = value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    out.push_str(name);
    out.push_str(": ");
    out.push_str(&value);
    out.push_str("\r\n");
}

fn push_body_part(out: &mut String, kind: ContentKind, body: &str) {
    let seven_bit = body.is_ascii() && body.lines().all(|l| l.len() <= MAX_7BIT_LINE);
    if seven_bit {
        out.push_str(&format!(
            "Content-Type: {}; charset=\"us-ascii\"\r\n",
            kind.mime_type()
        ));
        out.push_str("Content-Transfer-Encoding: 7bit\r\n\r\n");
        for line in body.lines() {
            out.push_str(line);
            out.push_str("\r\n");
        }
    } else {
        out.push_str(&format!(
            "Content-Type: {}; charset=\"utf-8\"\r\n",
            kind.mime_type()
        ));
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        push_base64(out, body.as_bytes());
    }
}

fn push_attachment_part(out: &mut String, attachment: &Attachment) {
    out.push_str("Content-Type: application/octet-stream\r\n");
    out.push_str("Content-Transfer-Encoding: base64\r\n");
    push_header(
        out,
        "Content-Disposition",
        &format!("attachment; filename={}", quote_filename(&attachment.filename)),
    );
    out.push_str("\r\n");
    push_base64(out, &attachment.content);
}

fn push_base64(out: &mut String, bytes: &[u8]) {
    let encoded = BASE64.encode(bytes);
    // base64 output is ASCII, so byte chunks are valid str boundaries
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
}

/// Bare token when possible, quoted string otherwise (RFC 2183)
fn quote_filename(filename: &str) -> String {
    let is_token = !filename.is_empty()
        && filename
            .chars()
            .all(|c| c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?=".contains(c));
    if is_token {
        filename.to_string()
    } else {
        format!("\"{}\"", filename.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// RFC 2047 encoded-word for non-ASCII header text
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", BASE64.encode(value.as_bytes()))
    }
}

fn message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{}>", uuid::Uuid::new_v4().simple(), domain)
}
