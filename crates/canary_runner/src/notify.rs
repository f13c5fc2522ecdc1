//! Notifier - sends failure reports to the operator list
//!
//! Supports:
//! - sendmail (pipes an RFC 822 message into `sendmail -t`)
//! - an HTTP mail relay (JSON POST with basic auth)
//!
//! One message goes to each recipient in order. A failed recipient does not
//! stop delivery to the rest.

use canary_common::config::{NotifyConfig, NotifyTransportKind, MAIL_PASSWORD_ENV, MAIL_USER_ENV};
use canary_common::NotifyError;
use chrono::Local;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{info, warn};

/// Delivery boundary used by the pipeline
pub trait Notifier {
    fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// A single outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn to_rfc822(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nDate: {}\nContent-Type: text/plain; charset=utf-8\n\n{}\n",
            self.from,
            self.to,
            single_line(&self.subject),
            Local::now().to_rfc2822(),
            self.body
        )
    }
}

// Header injection guard
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Moves one message to one recipient
pub trait MailTransport {
    fn name(&self) -> &'static str;

    /// Whether the transport can deliver at all (binary present, credentials set)
    fn ready(&self) -> Result<(), NotifyError>;

    fn send(&self, message: &MailMessage) -> Result<(), NotifyError>;
}

/// Mail-based notifier
pub struct MailNotifier {
    transport: Box<dyn MailTransport>,
    from: String,
    recipients: Vec<String>,
}

impl MailNotifier {
    pub fn new(transport: Box<dyn MailTransport>, from: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            transport,
            from: from.into(),
            recipients,
        }
    }

    /// Build the notifier the config asks for
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let transport: Box<dyn MailTransport> = match config.transport {
            NotifyTransportKind::Sendmail => Box::new(SendmailTransport::new(config.sendmail_path.clone())),
            NotifyTransportKind::Http => {
                let endpoint = config
                    .endpoint
                    .clone()
                    .ok_or_else(|| NotifyError::NotReady("no relay endpoint configured".to_string()))?;
                Box::new(HttpRelayTransport::from_env(
                    endpoint,
                    Duration::from_secs(config.timeout_secs),
                )?)
            }
        };
        Ok(Self::new(transport, config.from.clone(), config.addresses()))
    }

    /// Check delivery is possible before any work starts
    pub fn ready(&self) -> Result<(), NotifyError> {
        if self.recipients.is_empty() {
            return Err(NotifyError::NotReady("no recipients configured".to_string()));
        }
        self.transport.ready()
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }
}

impl Notifier for MailNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let mut failures = Vec::new();

        for recipient in &self.recipients {
            info!("notifying {} via {}", recipient, self.transport.name());
            let message = MailMessage {
                from: self.from.clone(),
                to: recipient.clone(),
                subject: subject.to_string(),
                body: body.to_string(),
            };
            if let Err(e) = self.transport.send(&message) {
                warn!("Failed to notify {}: {}", recipient, e);
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Partial {
                failed: failures.len(),
                total: self.recipients.len(),
                details: failures.join("; "),
            })
        }
    }
}

/// Delivers through the local sendmail binary
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    path: PathBuf,
}

impl SendmailTransport {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl MailTransport for SendmailTransport {
    fn name(&self) -> &'static str {
        "sendmail"
    }

    fn ready(&self) -> Result<(), NotifyError> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(NotifyError::NotReady(format!(
                "sendmail not found at {}",
                self.path.display()
            )))
        }
    }

    fn send(&self, message: &MailMessage) -> Result<(), NotifyError> {
        let mut child = Command::new(&self.path)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdin is dropped before waiting so sendmail sees EOF
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(message.to_rfc822().as_bytes()),
            None => Ok(()),
        };
        let output = child.wait_with_output()?;

        if let Err(e) = written {
            return Err(NotifyError::Transport {
                recipient: message.to.clone(),
                reason: format!("writing message to sendmail failed: {}", e),
            });
        }
        if output.status.success() {
            Ok(())
        } else {
            Err(NotifyError::Transport {
                recipient: message.to.clone(),
                reason: format!(
                    "sendmail exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

/// Delivers through an HTTP mail relay
pub struct HttpRelayTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
    user: String,
    password: String,
}

impl HttpRelayTransport {
    pub fn new(endpoint: String, user: String, password: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::NotReady(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            user,
            password,
        })
    }

    /// Credentials come from `CANARY_MAIL_USER` / `CANARY_MAIL_PASSWORD`
    pub fn from_env(endpoint: String, timeout: Duration) -> Result<Self, NotifyError> {
        let user = std::env::var(MAIL_USER_ENV).ok().filter(|v| !v.is_empty());
        let password = std::env::var(MAIL_PASSWORD_ENV).ok().filter(|v| !v.is_empty());
        match (user, password) {
            (Some(user), Some(password)) => Self::new(endpoint, user, password, timeout),
            _ => Err(NotifyError::NotReady(format!(
                "{} and {} must be set for the http mail relay",
                MAIL_USER_ENV, MAIL_PASSWORD_ENV
            ))),
        }
    }
}

impl MailTransport for HttpRelayTransport {
    fn name(&self) -> &'static str {
        "http relay"
    }

    fn ready(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    fn send(&self, message: &MailMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(message)
            .send()
            .map_err(|e| NotifyError::Transport {
                recipient: message.to.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Transport {
                recipient: message.to.clone(),
                reason: format!("relay returned {}", status),
            })
        }
    }
}
