//! Outbound email transport
//!
//! Services talk to the [`Mailer`] trait; [`SmtpMailer`] is the production
//! implementation on top of `lettre`.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::env;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while building or delivering an email
#[derive(Error, Debug)]
pub enum MailError {
    /// A sender or recipient address could not be parsed
    #[error("Invalid email address {address:?}: {reason}")]
    Address { address: String, reason: String },

    /// The message has no recipients
    #[error("Email has no recipients")]
    NoRecipients,

    /// The message could not be assembled
    #[error("Failed to build email: {0}")]
    Build(String),

    /// The SMTP exchange failed
    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// A single HTML email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

impl Email {
    pub fn new(
        from: impl Into<String>,
        to: Vec<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to,
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }
}

/// Email transport used by the services
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// SMTP configuration
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// SMTP relay host
    pub host: String,
    /// SMTP relay port
    pub port: u16,
    /// Optional login for the relay
    pub username: Option<String>,
    /// Optional password for the relay
    pub password: Option<String>,
    /// Use implicit TLS / STARTTLS towards the relay
    pub tls: bool,
}

impl MailConfig {
    /// Create a new MailConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SMTP_HOST`: relay host (default: "localhost")
    /// - `SMTP_PORT`: relay port (default: 25)
    /// - `SMTP_USERNAME` / `SMTP_PASSWORD`: credentials (optional)
    /// - `SMTP_TLS`: "true" to require TLS (default: false)
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "25".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid SMTP_PORT: {}", e))?;
        let username = env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty());
        let tls = env::var("SMTP_TLS")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            username,
            password,
            tls,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Build a `lettre` message out of an [`Email`]
pub fn build_message(email: &Email) -> Result<Message, MailError> {
    if email.to.is_empty() {
        return Err(MailError::NoRecipients);
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(&email.from)?)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_HTML);

    for recipient in &email.to {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    builder
        .body(email.html_body.clone())
        .map_err(|e| MailError::Build(e.to_string()))
}

/// SMTP backed mailer
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let builder = if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(
            "SMTP mailer initialized for {}:{} (tls: {})",
            config.host, config.port, config.tls
        );

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        debug!("Sent \"{}\" to {} recipient(s)", email.subject, email.to.len());
        Ok(())
    }
}

/// Mailer that only logs what it would send; for local runs without a relay
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        // still validate, so local runs catch bad addresses
        build_message(email)?;
        info!(
            "Email to {:?} from {}: \"{}\"\n{}",
            email.to, email.from, email.subject, email.html_body
        );
        Ok(())
    }
}
