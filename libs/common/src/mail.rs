//! Outbound mail delivery.
//!
//! Services depend on the [`Mailer`] trait and receive a concrete sender at
//! startup: [`SmtpMailer`] talks to a relay through lettre's async transport,
//! [`LogMailer`] writes the message to the log for local development.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, info};

use crate::error::MailError;

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Mail delivery abstraction.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `message`, returning once the relay has accepted it.
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587).
    #[default]
    StartTls,
    /// Implicit TLS from the first byte (port 465).
    Tls,
    /// No encryption; only for local relays such as Mailpit.
    None,
}

impl std::str::FromStr for SmtpSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(SmtpSecurity::StartTls),
            "tls" | "ssl" => Ok(SmtpSecurity::Tls),
            "none" | "plain" => Ok(SmtpSecurity::None),
            other => Err(format!("unknown SMTP security mode: {other}")),
        }
    }
}

/// SMTP relay settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security: SmtpSecurity,
    /// Sender mailbox, e.g. `My App <no-reply@example.com>`
    pub from: String,
}

/// Mailer backed by an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from: Mailbox = config.from.parse()?;

        let mut builder = match config.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(host = %config.host, port = config.port, security = ?config.security, "SMTP mailer configured");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Open and close a connection to the relay.
    pub async fn test_connection(&self) -> Result<bool, MailError> {
        Ok(self.transport.test_connection().await?)
    }

    fn build(&self, message: MailMessage) -> Result<Message, MailError> {
        let to: Mailbox = message.to.parse()?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject)
            .multipart(MultiPart::alternative_plain_html(message.text, message.html))?;
        Ok(email)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let to = message.to.clone();
        let email = self.build(message)?;
        self.transport.send(email).await?;
        debug!(to = %to, "mail accepted by relay");
        Ok(())
    }
}

/// Local development sender that logs the message instead of delivering it.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "mail delivery stubbed");
        debug!(body = %message.text, "stubbed mail body");
        Ok(())
    }
}
