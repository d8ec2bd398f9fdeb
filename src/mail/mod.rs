//! Outbound mail transport
//!
//! The core only ever hands a fully rendered message to a transport;
//! delivery is fire-and-forget from its perspective. The SMTP transport
//! backs production; the recording transport backs tests and local
//! development.

pub mod memory;
pub mod smtp;

use async_trait::async_trait;

use crate::types::Result;

pub use memory::RecordingMailer;
pub use smtp::{SmtpConfig, SmtpMailer};

/// One addressed message with plain-text and rich-text bodies
#[derive(Debug, Clone)]
pub struct MailMessage {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub text_body: String,
    /// Rich-text (HTML) body
    pub html_body: String,
}

/// Transport capable of sending one addressed message
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send a single message
    async fn send(&self, message: &MailMessage) -> Result<()>;
}
