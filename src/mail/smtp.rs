//! SMTP mail transport

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::types::{PipelineError, Result};

use super::{MailMessage, MailTransport};

/// SMTP connection configuration
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Server hostname
    pub host: String,
    /// Server port (STARTTLS)
    pub port: u16,
    /// Username; unauthenticated relay when absent
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Sender address
    pub sender: String,
}

/// Mail transport over SMTP with STARTTLS
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    /// Build a mailer from configuration
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| PipelineError::Mail(format!("sender address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| PipelineError::Mail(format!("SMTP relay {}: {e}", config.host)))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| PipelineError::Mail(format!("recipient {}: {e}", message.to)))?;

        let email = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                message.html_body.clone(),
            ))
            .map_err(|e| PipelineError::Mail(format!("build message: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| PipelineError::Mail(format!("send to {}: {e}", message.to)))?;

        debug!(to = %message.to, subject = %message.subject, "Mail sent");
        Ok(())
    }
}
