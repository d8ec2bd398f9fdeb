//! Aggregate outcome of one batch call

use serde::Serialize;
use uuid::Uuid;

use crate::types::FailureReason;

/// One successfully signed item
#[derive(Debug, Clone, Serialize)]
pub struct SignedItem {
    pub id: Uuid,
    pub title: String,
}

/// One failed item with its reason
#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub id: Uuid,
    pub reason: FailureReason,
}

/// Everything a caller learns about a batch call
///
/// Constructed per invocation and discarded after the response; every
/// requested id appears exactly once, in `success` or in `failed`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// Signed items, in completion-commit order
    pub success: Vec<SignedItem>,
    /// Failed items, in the order their failures were recorded
    pub failed: Vec<FailedItem>,
    /// Number of items requested
    pub total: usize,
    /// Wall-clock time spent in the call, milliseconds
    pub elapsed_ms: u64,
}

impl BatchOutcome {
    /// Empty outcome for a batch of the given size
    pub fn new(total: usize) -> Self {
        Self {
            success: Vec::new(),
            failed: Vec::new(),
            total,
            elapsed_ms: 0,
        }
    }

    /// Record a failure
    pub fn record_failure(&mut self, id: Uuid, reason: FailureReason) {
        self.failed.push(FailedItem { id, reason });
    }

    /// Record a success
    pub fn record_success(&mut self, id: Uuid, title: String) {
        self.success.push(SignedItem { id, title });
    }

    /// Failure reason recorded for an id, if any
    pub fn failure_reason(&self, id: Uuid) -> Option<&FailureReason> {
        self.failed.iter().find(|f| f.id == id).map(|f| &f.reason)
    }
}
