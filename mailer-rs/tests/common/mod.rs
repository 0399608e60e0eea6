//! Recording fake transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mailer_rs::smtp::{ConnectRequest, Connection, Connector, TransportError};
use mailer_rs::{Mailer, MailerConfig, MailerOptions, Settings};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// One `send_mail` call as seen by the fake server
#[derive(Debug, Clone)]
pub struct Transmission {
    pub from: String,
    pub recipients: Vec<String>,
    pub data: String,
    pub accepted: bool,
}

#[derive(Default)]
struct State {
    opens: usize,
    quits: usize,
    transmissions: Vec<Transmission>,
    auth_failure: Option<u16>,
    unreachable: bool,
    failing_sends: usize,
    session_revoked: bool,
    rejected: HashSet<String>,
}

/// Fake connector; clones share the same recorded state
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject AUTH with the given reply code
    pub fn reject_auth(self, code: u16) -> Self {
        self.state.lock().unwrap().auth_failure = Some(code);
        self
    }

    pub fn unreachable(self) -> Self {
        self.state.lock().unwrap().unreachable = true;
        self
    }

    /// Fail the next `count` transactions
    pub fn fail_sends(self, count: usize) -> Self {
        self.state.lock().unwrap().failing_sends = count;
        self
    }

    /// Answer every transaction with 530 "authentication required"
    pub fn revoke_session(self) -> Self {
        self.state.lock().unwrap().session_revoked = true;
        self
    }

    /// Fail every transaction addressed to `recipient`
    pub fn reject_recipient(self, recipient: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected
            .insert(recipient.to_string());
        self
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn quits(&self) -> usize {
        self.state.lock().unwrap().quits
    }

    /// Every attempted transaction, accepted or not
    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state.lock().unwrap().transmissions.clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().transmissions.len()
    }

    pub fn mailer(&self) -> Mailer {
        Mailer::with_connector(test_config(), Arc::new(self.clone()))
    }
}

#[async_trait]
impl Connector for FakeTransport {
    async fn open(&self, request: &ConnectRequest) -> Result<Box<dyn Connection>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;

        if state.unreachable {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("connection refused by {}", request.endpoint),
            )));
        }
        if let Some(code) = state.auth_failure {
            return Err(TransportError::Auth {
                code,
                message: "5.7.8 Username and Password not accepted".to_string(),
            });
        }

        Ok(Box::new(FakeConnection {
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send_mail(
        &mut self,
        from: &str,
        recipients: &[String],
        data: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();

        if state.session_revoked {
            state.transmissions.push(Transmission {
                from: from.to_string(),
                recipients: recipients.to_vec(),
                data: data.to_string(),
                accepted: false,
            });
            return Err(TransportError::Auth {
                code: 530,
                message: "5.7.0 Authentication Required".to_string(),
            });
        }

        let rejected = recipients.iter().find(|r| state.rejected.contains(*r)).cloned();
        let failing = state.failing_sends > 0;
        if failing {
            state.failing_sends -= 1;
        }
        let accepted = rejected.is_none() && !failing;

        state.transmissions.push(Transmission {
            from: from.to_string(),
            recipients: recipients.to_vec(),
            data: data.to_string(),
            accepted,
        });

        match rejected {
            Some(recipient) => Err(TransportError::Rejected {
                code: 550,
                message: format!("5.1.1 <{}>: Recipient address rejected", recipient),
            }),
            None if failing => Err(TransportError::Rejected {
                code: 451,
                message: "4.3.0 Temporary server error".to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn quit(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().quits += 1;
        Ok(())
    }
}

pub fn test_config() -> MailerConfig {
    MailerConfig::resolve(
        MailerOptions::new()
            .email("test@gmail.com")
            .password("pass"),
        &Settings::default(),
    )
    .unwrap()
}
