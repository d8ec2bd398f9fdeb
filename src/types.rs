//! Crate-wide error types
//!
//! Two layers: `PipelineError` for failures that cross a call boundary, and
//! `FailureReason` for per-item failures recorded inside a batch outcome.
//! A batch call returns either one `PipelineError` or an outcome that
//! accounts for every requested id - never a mixture.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::domain::RequestStatus;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort an operation at its call boundary
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Repository (persistence collaborator) failure
    #[error("Repository error: {0}")]
    Repository(String),

    /// File store failure (read, write, delete, missing root)
    #[error("Storage error: {0}")]
    Storage(String),

    /// QR payload encoding or raster rendering failure
    #[error("QR generation error: {0}")]
    Qr(String),

    /// Document overlay/serialization failure
    #[error("Composition error: {0}")]
    Composition(String),

    /// Outbound mail failure
    #[error("Mail error: {0}")]
    Mail(String),

    /// Batch admission check: too many items requested at once
    #[error("Batch too large: {given} items exceeds the {limit}-item limit")]
    BatchTooLarge { given: usize, limit: usize },

    /// The acting signer has no profile on file
    #[error("Signer not found: {0}")]
    SignerNotFound(String),

    /// The acting signer has no signature image on file
    #[error("Signer {0} has no signature image on file")]
    SignatureMissing(String),

    /// Single-item operation refused for an item-level reason
    #[error("Request {id}: {reason}")]
    ItemRefused { id: uuid::Uuid, reason: FailureReason },
}

/// Why a single batch item failed
///
/// Carried in the outcome's failure list; `code()` is the stable machine
/// identifier, `Display` the human-readable reason string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No request exists with the given id
    NotFound,
    /// The request is assigned to a different signer
    Unauthorized,
    /// The request is not in a signable state
    StateConflict(RequestStatus),
    /// The request has no source document attached
    MissingDocument,
    /// The bulk fetch for the item's chunk failed
    Repository,
    /// QR generation or document overlay failed for this item
    Composition(String),
    /// The chunk's grouped commit failed; staged success was rolled back
    Commit,
}

impl FailureReason {
    /// Stable machine-readable code for this reason
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::NotFound => "not_found",
            FailureReason::Unauthorized => "unauthorized",
            FailureReason::StateConflict(_) => "state_conflict",
            FailureReason::MissingDocument => "missing_document",
            FailureReason::Repository => "repository",
            FailureReason::Composition(_) => "composition",
            FailureReason::Commit => "commit_failure",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NotFound => write!(f, "not found"),
            FailureReason::Unauthorized => write!(f, "not assigned to this signer"),
            FailureReason::StateConflict(status) => {
                write!(f, "cannot sign (status: {status})")
            }
            FailureReason::MissingDocument => write!(f, "no source document attached"),
            FailureReason::Repository => write!(f, "repository unavailable"),
            FailureReason::Composition(detail) => write!(f, "composition failed: {detail}"),
            FailureReason::Commit => write!(f, "commit failure"),
        }
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
