//! Provenance payloads and QR raster generation
//!
//! A provenance payload proves who signed what and when. It is built fresh
//! per signing event, serialized once with a stable field order, embedded
//! into a scannable raster, and never mutated or persisted on its own.

mod payload;
mod qr;

pub use payload::{ProvenancePayload, RequestorIdentity};
pub use qr::{QrArtifact, QrConfig, QrGenerator};
