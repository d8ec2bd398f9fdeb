//! Domain model for signing requests and signer profiles
//!
//! The core only moves requests from a signable state (pending or approved)
//! to signed or rejected; creation and approval happen elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a signing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Signed,
}

impl RequestStatus {
    /// Whether a request in this state may still be signed or rejected
    pub fn is_signable(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Approved)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Signed => "signed",
        };
        f.write_str(s)
    }
}

/// Closed set of request categories
///
/// Category-specific document content hangs off the variant, never off a
/// category name string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestCategory {
    Endorsement,
    Recommendation,
    TranscriptReview,
    Internship,
}

impl RequestCategory {
    /// Human-readable label used on signed documents and in notifications
    pub fn label(self) -> &'static str {
        match self {
            RequestCategory::Endorsement => "Endorsement",
            RequestCategory::Recommendation => "Letter of Recommendation",
            RequestCategory::TranscriptReview => "Transcript Review",
            RequestCategory::Internship => "Internship Approval",
        }
    }

    /// Instructional lines printed beneath the signer title, if the
    /// category calls for them
    pub fn annotation_lines(self) -> Option<&'static [&'static str]> {
        match self {
            RequestCategory::TranscriptReview => Some(&[
                "Please resubmit your transcript when registering for",
                "graduation so the department head can countersign it.",
            ]),
            RequestCategory::Endorsement
            | RequestCategory::Recommendation
            | RequestCategory::Internship => None,
        }
    }
}

impl std::fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity snapshot of the person who filed the request
///
/// Eager-loaded with the request so composition tasks never touch the
/// repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestorSnapshot {
    /// Requestor user id
    pub id: String,

    /// Display name
    pub display_name: String,

    /// Institutional registration number, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,

    /// Contact address for completion notices
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A document awaiting or having received a signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningRequest {
    /// Request id
    pub id: Uuid,

    /// Request title
    pub title: String,

    /// Request category
    pub category: RequestCategory,

    /// Who filed the request
    pub requestor: RequestorSnapshot,

    /// Id of the signer this request is assigned to
    pub signer_id: String,

    /// Lifecycle state
    pub status: RequestStatus,

    /// Source document, relative to the source-uploads root
    pub source_document: Option<String>,

    /// Signed document, relative to the signed-outputs root.
    /// Set if and only if status is signed.
    pub signed_document: Option<String>,

    /// QR raster, relative to the QR-outputs root
    pub qr_code: Option<String>,

    /// Canonical provenance string embedded in the QR raster
    pub qr_data: Option<String>,

    /// When the request was signed
    pub signed_at: Option<DateTime<Utc>>,

    /// When the request was rejected
    pub rejected_at: Option<DateTime<Utc>>,

    /// Why the request was rejected
    pub rejection_comment: Option<String>,
}

impl SigningRequest {
    /// Create a new pending request
    pub fn new(
        title: String,
        category: RequestCategory,
        requestor: RequestorSnapshot,
        signer_id: String,
        source_document: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            category,
            requestor,
            signer_id,
            status: RequestStatus::Pending,
            source_document,
            signed_document: None,
            qr_code: None,
            qr_data: None,
            signed_at: None,
            rejected_at: None,
            rejection_comment: None,
        }
    }
}

/// The authorized party whose signature is embedded into signed artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerProfile {
    /// Signer user id
    pub id: String,

    /// Display name printed under the signature
    pub display_name: String,

    /// Title printed under the name
    pub title: String,

    /// Signature image, relative to the source-uploads root.
    /// Must be on file before any signing on behalf of this signer.
    pub signature_image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signable_states() {
        assert!(RequestStatus::Pending.is_signable());
        assert!(RequestStatus::Approved.is_signable());
        assert!(!RequestStatus::Rejected.is_signable());
        assert!(!RequestStatus::Signed.is_signable());
    }

    #[test]
    fn test_only_review_carries_annotation() {
        assert!(RequestCategory::TranscriptReview.annotation_lines().is_some());
        assert!(RequestCategory::Endorsement.annotation_lines().is_none());
        assert!(RequestCategory::Recommendation.annotation_lines().is_none());
        assert!(RequestCategory::Internship.annotation_lines().is_none());
    }

    #[test]
    fn test_new_request_is_pending() {
        let request = SigningRequest::new(
            "Transcript copy".to_string(),
            RequestCategory::Endorsement,
            RequestorSnapshot {
                id: "student-1".to_string(),
                display_name: "Alice".to_string(),
                registration_number: Some("672019001".to_string()),
                email: Some("alice@example.edu".to_string()),
            },
            "lecturer-1".to_string(),
            Some("requests/doc.pdf".to_string()),
        );

        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.signed_document.is_none());
        assert!(request.signed_at.is_none());
    }
}
