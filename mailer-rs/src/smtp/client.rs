//! SMTP submission client (RFC 5321, RFC 3207 STARTTLS, RFC 4954 AUTH)
//!
//! [`SmtpConnector`] performs the whole session establishment:
//! greeting, EHLO, STARTTLS, EHLO again, AUTH. The resulting
//! [`SmtpConnection`] runs mail transactions until QUIT.

use crate::smtp::tls;
use crate::smtp::transport::{ConnectRequest, Connection, Connector, TransportError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rustls::Certificate;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, TransportError>;

/// "Authentication required" (RFC 4954 §6)
const AUTH_REQUIRED: u16 = 530;

/// A parsed (possibly multi-line) server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Parse the raw lines of one reply
    pub fn parse(raw: &str) -> Result<Self> {
        let mut code = None;
        let mut lines = Vec::new();

        for line in raw.lines() {
            let line_code = line
                .get(..3)
                .and_then(|c| c.parse::<u16>().ok())
                .ok_or_else(|| TransportError::Protocol(format!("Malformed reply: {}", raw.trim())))?;
            code.get_or_insert(line_code);
            lines.push(line.get(4..).unwrap_or("").to_string());
        }

        match code {
            Some(code) => Ok(Self { code, lines }),
            None => Err(TransportError::Protocol("Empty reply".to_string())),
        }
    }

    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    fn rejected(&self) -> TransportError {
        TransportError::Rejected {
            code: self.code,
            message: self.text(),
        }
    }
}

/// EHLO keywords advertised by the server
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    keywords: Vec<String>,
}

impl Capabilities {
    /// The first EHLO line is the server greeting, the rest are extensions
    pub fn from_ehlo(reply: &Reply) -> Self {
        Self {
            keywords: reply
                .lines
                .iter()
                .skip(1)
                .map(|l| l.trim().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn supports(&self, keyword: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| k.split_whitespace().next() == Some(keyword))
    }

    /// Mechanisms listed on the `AUTH` line
    pub fn auth_mechanisms(&self) -> Vec<&str> {
        self.keywords
            .iter()
            .filter_map(|k| {
                let mut words = k.split_whitespace();
                match words.next() {
                    Some("AUTH") => Some(words.collect::<Vec<_>>()),
                    _ => None,
                }
            })
            .flatten()
            .collect()
    }
}

/// Plain-text or TLS socket, so the engine is written once
enum SmtpStream {
    Plain(BufReader<TcpStream>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

impl SmtpStream {
    async fn read_line(&mut self, buf: &mut String) -> Result<usize> {
        let n = match self {
            SmtpStream::Plain(r) => r.read_line(buf).await?,
            SmtpStream::Tls(r) => r.read_line(buf).await?,
        };
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            SmtpStream::Plain(r) => {
                r.get_mut().write_all(data).await?;
                r.get_mut().flush().await?;
            }
            SmtpStream::Tls(r) => {
                r.get_mut().write_all(data).await?;
                r.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        match self {
            SmtpStream::Plain(r) => r.get_mut().shutdown().await?,
            SmtpStream::Tls(r) => r.get_mut().shutdown().await?,
        }
        Ok(())
    }
}

/// Opens STARTTLS-protected, authenticated SMTP sessions
#[derive(Clone)]
pub struct SmtpConnector {
    tls: TlsConnector,
}

impl SmtpConnector {
    /// Trust the webpki roots only
    pub fn new() -> Result<Self> {
        Self::with_root_certificates(&[])
    }

    /// Trust the webpki roots plus the given DER certificates
    pub fn with_root_certificates(extra_roots: &[Certificate]) -> Result<Self> {
        Ok(Self {
            tls: tls::connector(extra_roots)?,
        })
    }

    /// Trust the webpki roots plus every certificate in a PEM bundle
    pub fn with_ca_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let roots = tls::load_pem_certificates(path)?;
        Self::with_root_certificates(&roots)
    }

    async fn establish(&self, request: &ConnectRequest) -> Result<SmtpConnection> {
        let addr = request.endpoint.address();
        debug!("Connecting to SMTP server {}", addr);

        let tcp = TcpStream::connect(&addr).await?;
        let mut conn = SmtpConnection {
            stream: Some(SmtpStream::Plain(BufReader::new(tcp))),
        };

        let greeting = conn.read_reply().await?;
        if !greeting.is_positive() {
            return Err(TransportError::Protocol(format!(
                "Server rejected connection: {} {}",
                greeting.code,
                greeting.text()
            )));
        }
        debug!("Received greeting: {}", greeting.text());

        let capabilities = conn.ehlo(&request.ehlo_domain).await?;
        if !capabilities.supports("STARTTLS") {
            return Err(TransportError::Tls(format!(
                "{} does not advertise STARTTLS",
                request.endpoint.host
            )));
        }

        conn.starttls(&self.tls, &request.endpoint.host).await?;

        // RFC 3207 §4.2: capabilities must be re-read after the upgrade
        let capabilities = conn.ehlo(&request.ehlo_domain).await?;
        conn.authenticate(&capabilities, &request.username, &request.password)
            .await?;

        Ok(conn)
    }
}

#[async_trait]
impl Connector for SmtpConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<Box<dyn Connection>> {
        let conn = tokio::time::timeout(request.timeout, self.establish(request))
            .await
            .map_err(|_| TransportError::Timeout {
                endpoint: request.endpoint.address(),
                timeout: request.timeout,
            })??;

        info!("SMTP session established with {}", request.endpoint);
        Ok(Box::new(conn))
    }
}

/// An authenticated SMTP session
pub struct SmtpConnection {
    stream: Option<SmtpStream>,
}

impl SmtpConnection {
    async fn ehlo(&mut self, domain: &str) -> Result<Capabilities> {
        let reply = self.command(&format!("EHLO {}", domain)).await?;
        if !reply.is_positive() {
            return Err(reply.rejected());
        }
        Ok(Capabilities::from_ehlo(&reply))
    }

    async fn starttls(&mut self, connector: &TlsConnector, host: &str) -> Result<()> {
        let reply = self.command("STARTTLS").await?;
        if !reply.is_positive() {
            return Err(TransportError::Tls(format!(
                "STARTTLS rejected: {} {}",
                reply.code,
                reply.text()
            )));
        }

        let tcp = match self.stream.take() {
            Some(SmtpStream::Plain(reader)) => reader.into_inner(),
            Some(tls_stream @ SmtpStream::Tls(_)) => {
                self.stream = Some(tls_stream);
                return Err(TransportError::Tls("Session is already encrypted".to_string()));
            }
            None => return Err(TransportError::NotConnected),
        };

        let server_name = tls::server_name(host)?;
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| TransportError::Tls(format!("TLS handshake failed: {}", e)))?;

        self.stream = Some(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))));
        debug!("STARTTLS upgrade completed");
        Ok(())
    }

    /// AUTH PLAIN unless the server only offers LOGIN
    async fn authenticate(
        &mut self,
        capabilities: &Capabilities,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let mechanisms = capabilities.auth_mechanisms();
        let use_login = !mechanisms.contains(&"PLAIN") && mechanisms.contains(&"LOGIN");

        let reply = if use_login {
            let reply = self.command("AUTH LOGIN").await?;
            if !reply.is_intermediate() {
                return Err(auth_failure(&reply));
            }
            let reply = self.command_redacted(&BASE64.encode(username), "AUTH LOGIN <user>").await?;
            if !reply.is_intermediate() {
                return Err(auth_failure(&reply));
            }
            self.command_redacted(&BASE64.encode(password), "AUTH LOGIN <password>")
                .await?
        } else {
            let payload = format!("\0{}\0{}", username, password);
            self.command_redacted(
                &format!("AUTH PLAIN {}", BASE64.encode(payload.as_bytes())),
                "AUTH PLAIN ****",
            )
            .await?
        };

        if reply.is_positive() {
            debug!("Authenticated as {}", username);
            Ok(())
        } else {
            Err(auth_failure(&reply))
        }
    }

    async fn command(&mut self, line: &str) -> Result<Reply> {
        debug!("> {}", line);
        self.write_line(line).await?;
        self.read_reply().await
    }

    async fn command_redacted(&mut self, line: &str, shown: &str) -> Result<Reply> {
        debug!("> {}", shown);
        self.write_line(line).await?;
        self.read_reply().await
    }

    async fn expect_positive(&mut self, line: &str) -> Result<Reply> {
        let reply = self.command(line).await?;
        if !reply.is_positive() {
            return Err(reply.rejected());
        }
        Ok(reply)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(format!("{}\r\n", line).as_bytes()).await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut full_response = String::new();

        loop {
            let mut line = String::new();
            if stream.read_line(&mut line).await? == 0 {
                return Err(TransportError::Protocol(
                    "Connection closed by server".to_string(),
                ));
            }
            debug!("< {}", line.trim_end());
            full_response.push_str(&line);

            // "250-" continues a multi-line reply, "250 " or a bare "250" ends it
            let trimmed = line.trim_end();
            if trimmed.len() <= 3 || trimmed.as_bytes()[3] == b' ' {
                break;
            }
        }

        Reply::parse(&full_response)
    }

    async fn transaction(&mut self, from: &str, recipients: &[String], data: &str) -> Result<()> {
        // Nothing goes on the wire unless every envelope address is a single line
        for address in std::iter::once(from).chain(recipients.iter().map(String::as_str)) {
            check_envelope_address(address)?;
        }

        let reply = self.command(&format!("MAIL FROM:<{}>", from)).await?;
        if reply.code == AUTH_REQUIRED {
            return Err(TransportError::Auth {
                code: reply.code,
                message: reply.text(),
            });
        }
        if !reply.is_positive() {
            return Err(reply.rejected());
        }

        for recipient in recipients {
            self.expect_positive(&format!("RCPT TO:<{}>", recipient))
                .await?;
        }

        let reply = self.command("DATA").await?;
        if !reply.is_intermediate() {
            return Err(reply.rejected());
        }

        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(dot_stuff(data).as_bytes()).await?;
        stream.write_all(b".\r\n").await?;

        let reply = self.read_reply().await?;
        if !reply.is_positive() {
            return Err(reply.rejected());
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SmtpConnection {
    async fn send_mail(&mut self, from: &str, recipients: &[String], data: &str) -> Result<()> {
        let result = self.transaction(from, recipients, data).await;

        if let Err(TransportError::Rejected { .. }) = &result {
            // Leave the session usable for the next message
            if let Err(e) = self.command("RSET").await {
                warn!("RSET after rejected transaction failed: {}", e);
            }
        }
        result
    }

    async fn quit(&mut self) -> Result<()> {
        let outcome = self.command("QUIT").await.map(|_| ());
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        outcome
    }
}

fn auth_failure(reply: &Reply) -> TransportError {
    // 4xx is a temporary condition, not a credential problem
    if reply.code >= 500 {
        TransportError::Auth {
            code: reply.code,
            message: reply.text(),
        }
    } else {
        reply.rejected()
    }
}

fn check_envelope_address(address: &str) -> Result<()> {
    if address.contains(['\r', '\n']) {
        return Err(TransportError::Protocol(format!(
            "Line break in envelope address {:?}",
            address
        )));
    }
    Ok(())
}

/// Normalize line endings to CRLF and double leading dots (RFC 5321 §4.5.2)
fn dot_stuff(data: &str) -> String {
    let mut result = String::with_capacity(data.len() + 64);
    for line in data.lines() {
        if line.starts_with('.') {
            result.push('.');
        }
        result.push_str(line);
        result.push_str("\r\n");
    }
    result
}
