//! Recording mail transport for tests and local development

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::Result;

use super::{MailMessage, MailTransport};

/// Transport that records every message instead of sending it
#[derive(Default)]
pub struct RecordingMailer {
    sent: RwLock<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded so far
    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.read().await.clone()
    }

    /// Number of messages recorded so far
    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        self.sent.write().await.push(message.clone());
        Ok(())
    }
}
