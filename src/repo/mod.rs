//! Persistence collaborator traits
//!
//! The pipeline talks to its stores through these traits; the in-memory
//! implementations in [`memory`] back tests and local development.
//! Grouped mutations land in one call so state is only touched at
//! chunk-commit points.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{SignerProfile, SigningRequest};
use crate::types::Result;

pub use memory::{InMemoryRequestRepository, InMemorySignerRepository};

/// Staged per-item mutation buffered between the parallel phase and the
/// grouped commit
#[derive(Debug, Clone)]
pub struct StagedSigning {
    /// Request being signed
    pub request_id: Uuid,
    /// Signed document, relative to the signed-outputs root
    pub signed_document: String,
    /// QR raster, relative to the QR-outputs root
    pub qr_code: String,
    /// Canonical provenance string embedded in the raster
    pub qr_data: String,
    /// Signing timestamp
    pub signed_at: DateTime<Utc>,
}

/// Store of signing requests
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Fetch a single request by id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<SigningRequest>>;

    /// Bulk fetch with eager-loaded requestor and category data.
    /// Unknown ids are simply absent from the result.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<SigningRequest>>;

    /// Persist a chunk's staged mutations as one grouped state transition.
    /// Either every staged item transitions to signed or none does.
    async fn commit_signed(&self, staged: &[StagedSigning]) -> Result<()>;

    /// Persist a rejection (status, comment, timestamp) for one request
    async fn commit_rejection(
        &self,
        id: Uuid,
        comment: &str,
        rejected_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Signed requests older than the cutoff whose artifact reference is
    /// still live (used by the retention sweep)
    async fn find_signed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SigningRequest>>;

    /// Mark the signed-artifact references of the given requests expired,
    /// as one grouped mutation
    async fn expire_artifacts(&self, ids: &[Uuid]) -> Result<()>;
}

/// Store of signer profiles
#[async_trait]
pub trait SignerRepository: Send + Sync {
    /// Fetch a signer profile by id
    async fn find_by_id(&self, id: &str) -> Result<Option<SignerProfile>>;
}
