//! Signing-event provenance payload

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::SigningRequest;
use crate::types::{PipelineError, Result};

/// Requestor identity snapshot carried inside the payload
#[derive(Debug, Clone, Serialize)]
pub struct RequestorIdentity {
    /// Display name
    pub name: String,

    /// Institutional registration number, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
}

/// Structured data proving who signed what and when
///
/// Canonical serialization follows struct declaration order; serde_json
/// keeps that order stable across runs.
#[derive(Debug, Clone, Serialize)]
pub struct ProvenancePayload {
    /// Request being signed
    pub request_id: String,

    /// Acting signer id
    pub signed_by: String,

    /// Signing timestamp, RFC 3339 with second precision
    pub signed_at: String,

    /// Who requested the signature
    pub requested_by: RequestorIdentity,
}

impl ProvenancePayload {
    /// Build a payload for one signing event
    pub fn new(request: &SigningRequest, signer_id: &str, signed_at: DateTime<Utc>) -> Self {
        Self {
            request_id: request.id.to_string(),
            signed_by: signer_id.to_string(),
            signed_at: signed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            requested_by: RequestorIdentity {
                name: request.requestor.display_name.clone(),
                registration_number: request.requestor.registration_number.clone(),
            },
        }
    }

    /// Canonical serialized form embedded in the QR raster and stored
    /// alongside the request
    pub fn canonical_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| PipelineError::Qr(format!("payload serialization: {e}")))
    }

    /// The request id this payload was built for
    pub fn request_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.request_id)
            .map_err(|e| PipelineError::Qr(format!("payload request id: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RequestCategory, RequestorSnapshot};

    fn sample_request() -> SigningRequest {
        SigningRequest::new(
            "Transcript copy".to_string(),
            RequestCategory::Endorsement,
            RequestorSnapshot {
                id: "student-1".to_string(),
                display_name: "Alice Wong".to_string(),
                registration_number: Some("672019001".to_string()),
                email: Some("alice@example.edu".to_string()),
            },
            "lecturer-1".to_string(),
            Some("doc.pdf".to_string()),
        )
    }

    #[test]
    fn test_canonical_field_order() {
        let request = sample_request();
        let payload = ProvenancePayload::new(&request, "lecturer-1", Utc::now());
        let json = payload.canonical_json().unwrap();

        let request_id_pos = json.find("\"request_id\"").unwrap();
        let signed_by_pos = json.find("\"signed_by\"").unwrap();
        let signed_at_pos = json.find("\"signed_at\"").unwrap();
        let requested_by_pos = json.find("\"requested_by\"").unwrap();

        assert!(request_id_pos < signed_by_pos);
        assert!(signed_by_pos < signed_at_pos);
        assert!(signed_at_pos < requested_by_pos);
    }

    #[test]
    fn test_payload_snapshot_contents() {
        let request = sample_request();
        let payload = ProvenancePayload::new(&request, "lecturer-1", Utc::now());

        assert_eq!(payload.request_id, request.id.to_string());
        assert_eq!(payload.signed_by, "lecturer-1");
        assert_eq!(payload.requested_by.name, "Alice Wong");
        assert_eq!(
            payload.requested_by.registration_number.as_deref(),
            Some("672019001")
        );
        assert_eq!(payload.request_id().unwrap(), request.id);
    }

    #[test]
    fn test_missing_registration_number_is_omitted() {
        let mut request = sample_request();
        request.requestor.registration_number = None;
        let payload = ProvenancePayload::new(&request, "lecturer-1", Utc::now());

        let json = payload.canonical_json().unwrap();
        assert!(!json.contains("registration_number"));
    }
}
