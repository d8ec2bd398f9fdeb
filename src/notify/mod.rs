//! Completion notification dispatch
//!
//! The orchestrator emits one-way messages onto an outbound channel; an
//! independent worker consumes them and delivers mail with a strategy
//! chosen by recipient volume. Delivery is best-effort and runs outside
//! the commit boundary - a failed send can never alter committed request
//! state.

pub mod dispatcher;
pub mod message;

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::RequestCategory;

pub use dispatcher::{
    select_strategy, DeliveryStrategy, DispatchReport, NotificationDispatcher, NotifyConfig,
    LARGE_POOL_MAX_RECIPIENTS, SEQUENTIAL_MAX_RECIPIENTS, SMALL_POOL_MAX_RECIPIENTS,
};

/// One signed item as it appears in a notification
#[derive(Debug, Clone)]
pub struct SignedSummary {
    pub title: String,
    pub category: RequestCategory,
}

/// Everything one recipient is told about
#[derive(Debug, Clone, Default)]
pub struct RecipientDigest {
    /// Recipient display name
    pub display_name: String,
    /// Signed items belonging to this recipient
    pub items: Vec<SignedSummary>,
}

/// Aggregated completion notice for a whole batch
#[derive(Debug, Clone)]
pub struct NotificationBatch {
    /// Display name of the signer, for the message body
    pub signer_name: String,
    /// Recipient address to digest
    pub recipients: HashMap<String, RecipientDigest>,
}

/// Message consumed by the dispatcher worker
#[derive(Debug, Clone)]
pub enum Notification {
    /// A batch completed; every recipient gets one aggregated notice
    BatchSigned(NotificationBatch),
    /// A single request was rejected
    Rejected {
        recipient: String,
        recipient_name: String,
        signer_name: String,
        title: String,
        comment: String,
    },
}

/// Sender half of the outbound notification channel
///
/// `dispatch` never blocks and never fails the caller; a full or closed
/// queue drops the notice with a warning.
#[derive(Clone)]
pub struct NotificationHandle {
    tx: mpsc::Sender<Notification>,
}

impl NotificationHandle {
    pub(crate) fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }

    /// Emit a notification; fire-and-forget
    pub fn dispatch(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            warn!(error = %e, "Notification queue unavailable; dropping notice");
        }
    }
}
