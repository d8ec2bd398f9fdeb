//! In-memory repository implementations
//!
//! Back tests and local development. The grouped commit is all-or-nothing:
//! every staged id is checked before any mutation is applied, all under one
//! write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{RequestStatus, SignerProfile, SigningRequest};
use crate::types::{PipelineError, Result};

use super::{RequestRepository, SignerRepository, StagedSigning};

/// Sentinel replacing a purged signed-artifact reference
pub const EXPIRED_ARTIFACT: &str = "expired";

/// In-memory request store
#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<Uuid, SigningRequest>>,
}

impl InMemoryRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a repository from a JSON snapshot; a missing file yields an
    /// empty repository
    pub async fn load_json(path: &std::path::Path) -> Result<Self> {
        let repo = Self::new();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(repo),
            Err(e) => {
                return Err(PipelineError::Repository(format!(
                    "read registry {}: {e}",
                    path.display()
                )))
            }
        };

        let requests: Vec<SigningRequest> = serde_json::from_slice(&bytes).map_err(|e| {
            PipelineError::Repository(format!("parse registry {}: {e}", path.display()))
        })?;

        let mut map = repo.requests.write().await;
        for request in requests {
            map.insert(request.id, request);
        }
        drop(map);

        Ok(repo)
    }

    /// Write the repository back out as a JSON snapshot
    pub async fn dump_json(&self, path: &std::path::Path) -> Result<()> {
        let requests = self.requests.read().await;
        let mut snapshot: Vec<&SigningRequest> = requests.values().collect();
        snapshot.sort_by_key(|r| r.id);

        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(|e| {
            PipelineError::Repository(format!("serialize registry: {e}"))
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::Repository(format!("create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(path, bytes).await.map_err(|e| {
            PipelineError::Repository(format!("write registry {}: {e}", path.display()))
        })
    }

    /// Seed a request into the store
    pub async fn insert(&self, request: SigningRequest) {
        self.requests.write().await.insert(request.id, request);
    }

    /// Snapshot of a request's current state
    pub async fn get(&self, id: Uuid) -> Option<SigningRequest> {
        self.requests.read().await.get(&id).cloned()
    }

    /// Number of requests currently in the given status
    pub async fn count_in_status(&self, status: RequestStatus) -> usize {
        self.requests
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .count()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<SigningRequest>> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<SigningRequest>> {
        let requests = self.requests.read().await;
        Ok(ids.iter().filter_map(|id| requests.get(id).cloned()).collect())
    }

    async fn commit_signed(&self, staged: &[StagedSigning]) -> Result<()> {
        let mut requests = self.requests.write().await;

        // Verify the whole group before touching anything
        for item in staged {
            if !requests.contains_key(&item.request_id) {
                return Err(PipelineError::Repository(format!(
                    "commit references unknown request {}",
                    item.request_id
                )));
            }
        }

        for item in staged {
            let request = requests
                .get_mut(&item.request_id)
                .expect("presence verified above");
            request.status = RequestStatus::Signed;
            request.signed_document = Some(item.signed_document.clone());
            request.qr_code = Some(item.qr_code.clone());
            request.qr_data = Some(item.qr_data.clone());
            request.signed_at = Some(item.signed_at);
        }

        Ok(())
    }

    async fn commit_rejection(
        &self,
        id: Uuid,
        comment: &str,
        rejected_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut requests = self.requests.write().await;
        let request = requests.get_mut(&id).ok_or_else(|| {
            PipelineError::Repository(format!("rejection references unknown request {id}"))
        })?;

        request.status = RequestStatus::Rejected;
        request.rejection_comment = Some(comment.to_string());
        request.rejected_at = Some(rejected_at);

        Ok(())
    }

    async fn find_signed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SigningRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| {
                r.status == RequestStatus::Signed
                    && r.signed_document.as_deref().is_some_and(|d| d != EXPIRED_ARTIFACT)
                    && r.signed_at.is_some_and(|at| at < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn expire_artifacts(&self, ids: &[Uuid]) -> Result<()> {
        let mut requests = self.requests.write().await;
        for id in ids {
            if let Some(request) = requests.get_mut(id) {
                request.signed_document = Some(EXPIRED_ARTIFACT.to_string());
            }
        }
        Ok(())
    }
}

/// In-memory signer store
#[derive(Default)]
pub struct InMemorySignerRepository {
    signers: RwLock<HashMap<String, SignerProfile>>,
}

impl InMemorySignerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a signer profile into the store
    pub async fn insert(&self, profile: SignerProfile) {
        self.signers.write().await.insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl SignerRepository for InMemorySignerRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<SignerProfile>> {
        Ok(self.signers.read().await.get(id).cloned())
    }
}
