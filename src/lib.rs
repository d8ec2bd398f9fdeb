//! Countersign - batch document-signing pipeline
//!
//! Turns approved signing requests into traceable signed artifacts: the
//! source document gets a visual signature block and a verification QR code
//! merged onto its final page, while batches are processed with bounded
//! parallelism, committed in chunks, and completion notices fan out
//! adaptively.
//!
//! ## Services
//!
//! - **Provenance**: canonical signing-event payloads rendered as QR rasters
//! - **Compose**: final-page signature overlay, atomic output
//! - **Batch**: chunked, failure-isolated batch orchestration
//! - **Notify**: volume-adaptive completion notification dispatch
//! - **Credential**: lock-guarded, TTL-bounded single-use code cache
//! - **Maintenance**: retention sweep over aged signed artifacts

pub mod batch;
pub mod compose;
pub mod config;
pub mod credential;
pub mod domain;
pub mod mail;
pub mod maintenance;
pub mod notify;
pub mod provenance;
pub mod repo;
pub mod store;
pub mod types;

pub use config::Args;
pub use types::{FailureReason, PipelineError, Result};
