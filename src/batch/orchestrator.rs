//! The batch orchestrator

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compose::{CompositionInput, SignatureCompositor};
use crate::domain::{RequestCategory, SignerProfile, SigningRequest};
use crate::notify::{
    Notification, NotificationBatch, NotificationHandle, RecipientDigest, SignedSummary,
};
use crate::provenance::{ProvenancePayload, QrGenerator};
use crate::repo::{RequestRepository, SignerRepository, StagedSigning};
use crate::store::{FileStore, StorageRoot};
use crate::types::{FailureReason, PipelineError, Result};

use super::{BatchOutcome, SignedItem};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard limit on items per batch call
    pub max_batch_size: usize,
    /// Items per chunk; one grouped commit per chunk
    pub chunk_size: usize,
    /// Upper bound on concurrent composition workers within a chunk
    pub compose_workers: usize,
    /// Pause between chunks, bounding mutation-rate pressure
    pub chunk_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            chunk_size: 10,
            compose_workers: 10,
            chunk_interval: Duration::from_millis(200),
        }
    }
}

/// Coordinates batch signing end to end
///
/// Chunks are processed strictly in sequence; chunk N's grouped commit
/// happens-before chunk N+1 begins. Within a chunk, items run on a bounded
/// worker pool and completion order is unspecified.
pub struct BatchOrchestrator<R, S> {
    config: OrchestratorConfig,
    requests: Arc<R>,
    signers: Arc<S>,
    store: FileStore,
    qr: QrGenerator,
    compositor: SignatureCompositor,
    notifications: NotificationHandle,
}

/// Result of one composition task, buffered until the chunk commit
struct StagedItem {
    staging: StagedSigning,
    title: String,
    category: RequestCategory,
    source_document: String,
    recipient: Option<(String, String)>,
}

/// Signer data shared by every composition task in a call
#[derive(Clone)]
struct SignerContext {
    id: String,
    name: String,
    title: String,
    signature_image: String,
}

impl<R, S> BatchOrchestrator<R, S>
where
    R: RequestRepository + 'static,
    S: SignerRepository + 'static,
{
    /// Create an orchestrator over its collaborators
    pub fn new(
        config: OrchestratorConfig,
        requests: Arc<R>,
        signers: Arc<S>,
        store: FileStore,
        qr: QrGenerator,
        compositor: SignatureCompositor,
        notifications: NotificationHandle,
    ) -> Self {
        Self {
            config,
            requests,
            signers,
            store,
            qr,
            compositor,
            notifications,
        }
    }

    /// Sign a batch of requests on behalf of one signer
    ///
    /// Returns a single top-level error only for an oversized input list or
    /// a signer without a usable profile; every other failure is recorded
    /// per item in the outcome.
    pub async fn sign_batch(&self, ids: Vec<Uuid>, signer_id: &str) -> Result<BatchOutcome> {
        let started = Instant::now();

        if ids.len() > self.config.max_batch_size {
            return Err(PipelineError::BatchTooLarge {
                given: ids.len(),
                limit: self.config.max_batch_size,
            });
        }

        // Resolve the signer once for the whole call
        let signer = self
            .signers
            .find_by_id(signer_id)
            .await?
            .ok_or_else(|| PipelineError::SignerNotFound(signer_id.to_string()))?;
        let signature_image = signer
            .signature_image
            .clone()
            .ok_or_else(|| PipelineError::SignatureMissing(signer_id.to_string()))?;

        info!(
            signer = %signer_id,
            items = ids.len(),
            chunk_size = self.config.chunk_size,
            "Starting batch signing"
        );

        let mut outcome = BatchOutcome::new(ids.len());
        let mut recipients: HashMap<String, RecipientDigest> = HashMap::new();

        let chunks: Vec<&[Uuid]> = ids.chunks(self.config.chunk_size).collect();
        let total_chunks = chunks.len();

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            self.process_chunk(chunk, &signer, &signature_image, &mut outcome, &mut recipients)
                .await;

            debug!(
                chunk = chunk_index + 1,
                of = total_chunks,
                signed = outcome.success.len(),
                failed = outcome.failed.len(),
                "Chunk finished"
            );

            if chunk_index + 1 < total_chunks {
                tokio::time::sleep(self.config.chunk_interval).await;
            }
        }

        if !recipients.is_empty() {
            self.notifications
                .dispatch(Notification::BatchSigned(NotificationBatch {
                    signer_name: signer.display_name.clone(),
                    recipients,
                }));
        }

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            signed = outcome.success.len(),
            failed = outcome.failed.len(),
            elapsed_ms = outcome.elapsed_ms,
            "Batch signing finished"
        );

        Ok(outcome)
    }

    /// Sign a single request; a per-item refusal surfaces as an error
    pub async fn sign_one(&self, id: Uuid, signer_id: &str) -> Result<SignedItem> {
        let outcome = self.sign_batch(vec![id], signer_id).await?;

        if let Some(item) = outcome.success.into_iter().next() {
            return Ok(item);
        }
        let reason = outcome
            .failed
            .into_iter()
            .next()
            .map(|f| f.reason)
            .unwrap_or(FailureReason::NotFound);
        Err(PipelineError::ItemRefused { id, reason })
    }

    /// Reject a request with a comment
    pub async fn reject(&self, id: Uuid, signer_id: &str, comment: &str) -> Result<()> {
        let request = self
            .requests
            .find_by_id(id)
            .await?
            .ok_or(PipelineError::ItemRefused {
                id,
                reason: FailureReason::NotFound,
            })?;

        if request.signer_id != signer_id {
            return Err(PipelineError::ItemRefused {
                id,
                reason: FailureReason::Unauthorized,
            });
        }
        if !request.status.is_signable() {
            return Err(PipelineError::ItemRefused {
                id,
                reason: FailureReason::StateConflict(request.status),
            });
        }

        self.requests.commit_rejection(id, comment, Utc::now()).await?;
        info!(request = %id, signer = %signer_id, "Request rejected");

        // The consumed upload is freed best-effort
        if let Some(source) = &request.source_document {
            if let Err(e) = self.store.delete(StorageRoot::SourceUploads, source).await {
                warn!(request = %id, error = %e, "Failed to delete source upload");
            }
        }

        if let Some(email) = &request.requestor.email {
            let signer_name = self
                .signers
                .find_by_id(signer_id)
                .await
                .ok()
                .flatten()
                .map(|s| s.display_name)
                .unwrap_or_else(|| signer_id.to_string());

            self.notifications.dispatch(Notification::Rejected {
                recipient: email.clone(),
                recipient_name: request.requestor.display_name.clone(),
                signer_name,
                title: request.title.clone(),
                comment: comment.to_string(),
            });
        }

        Ok(())
    }

    /// Validate, compose, and commit one chunk
    async fn process_chunk(
        &self,
        chunk: &[Uuid],
        signer: &SignerProfile,
        signature_image: &str,
        outcome: &mut BatchOutcome,
        recipients: &mut HashMap<String, RecipientDigest>,
    ) {
        // One eager bulk fetch per chunk; a fetch failure degrades every
        // id in the chunk, never the call
        let fetched = match self.requests.find_by_ids(chunk).await {
            Ok(requests) => requests,
            Err(e) => {
                warn!(error = %e, "Chunk fetch failed");
                for id in chunk {
                    outcome.record_failure(*id, FailureReason::Repository);
                }
                return;
            }
        };
        let mut by_id: HashMap<Uuid, SigningRequest> =
            fetched.into_iter().map(|r| (r.id, r)).collect();

        let mut valid = Vec::new();
        for id in chunk {
            let Some(request) = by_id.remove(id) else {
                outcome.record_failure(*id, FailureReason::NotFound);
                continue;
            };
            if request.signer_id != signer.id {
                outcome.record_failure(*id, FailureReason::Unauthorized);
                continue;
            }
            if !request.status.is_signable() {
                outcome.record_failure(*id, FailureReason::StateConflict(request.status));
                continue;
            }
            if request.source_document.is_none() {
                outcome.record_failure(*id, FailureReason::MissingDocument);
                continue;
            }
            valid.push(request);
        }

        if valid.is_empty() {
            return;
        }

        // Bounded parallel composition; each task owns its item's inputs
        let workers = self.config.compose_workers.min(valid.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        let context = SignerContext {
            id: signer.id.clone(),
            name: signer.display_name.clone(),
            title: signer.title.clone(),
            signature_image: signature_image.to_string(),
        };

        let handles: Vec<_> = valid
            .into_iter()
            .map(|request| {
                let semaphore = Arc::clone(&semaphore);
                let qr = self.qr.clone();
                let compositor = self.compositor.clone();
                let context = context.clone();
                let id = request.id;

                let handle = tokio::spawn(async move {
                    compose_item(request, context, qr, compositor, semaphore).await
                });
                (id, handle)
            })
            .collect();

        let mut staged = Vec::new();
        let (ids, futures): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (id, joined) in ids.into_iter().zip(join_all(futures).await) {
            match joined {
                Ok(Ok(item)) => staged.push(item),
                Ok(Err(reason)) => outcome.record_failure(id, reason),
                Err(e) => {
                    warn!(request = %id, error = %e, "Composition task aborted");
                    outcome.record_failure(
                        id,
                        FailureReason::Composition("composition task aborted".to_string()),
                    );
                }
            }
        }

        if staged.is_empty() {
            return;
        }

        // One grouped state transition per chunk; a commit failure
        // reclassifies every staged success and retains nothing
        let mutations: Vec<StagedSigning> = staged.iter().map(|s| s.staging.clone()).collect();
        match self.requests.commit_signed(&mutations).await {
            Ok(()) => {
                for item in staged {
                    outcome.record_success(item.staging.request_id, item.title.clone());

                    if let Some((email, name)) = item.recipient {
                        let digest = recipients.entry(email).or_default();
                        digest.display_name = name;
                        digest.items.push(SignedSummary {
                            title: item.title,
                            category: item.category,
                        });
                    }

                    if let Err(e) = self
                        .store
                        .delete(StorageRoot::SourceUploads, &item.source_document)
                        .await
                    {
                        warn!(
                            request = %item.staging.request_id,
                            error = %e,
                            "Failed to delete consumed source upload"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, staged = staged.len(), "Grouped commit failed; chunk degraded");
                for item in staged {
                    outcome.record_failure(item.staging.request_id, FailureReason::Commit);
                }
            }
        }
    }
}

/// Compose one item: provenance payload, QR raster, signed document
async fn compose_item(
    request: SigningRequest,
    signer: SignerContext,
    qr: QrGenerator,
    compositor: SignatureCompositor,
    semaphore: Arc<Semaphore>,
) -> std::result::Result<StagedItem, FailureReason> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| FailureReason::Composition("worker pool closed".to_string()))?;

    let source_document = request
        .source_document
        .clone()
        .ok_or(FailureReason::MissingDocument)?;

    let signed_at = Utc::now();
    let payload = ProvenancePayload::new(&request, &signer.id, signed_at);
    let artifact = qr
        .generate(&payload, request.id)
        .await
        .map_err(compose_failure)?;

    let output = signed_output_name(&source_document);
    compositor
        .compose_signed(CompositionInput {
            source_document: source_document.clone(),
            signature_image: signer.signature_image,
            qr_code: artifact.path.clone(),
            signer_name: signer.name,
            signer_title: signer.title,
            category: request.category,
            signed_at_display: signed_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            output: output.clone(),
        })
        .await
        .map_err(compose_failure)?;

    let recipient = request
        .requestor
        .email
        .clone()
        .map(|email| (email, request.requestor.display_name.clone()));

    Ok(StagedItem {
        staging: StagedSigning {
            request_id: request.id,
            signed_document: output,
            qr_code: artifact.path,
            qr_data: artifact.data,
            signed_at,
        },
        title: request.title,
        category: request.category,
        source_document,
        recipient,
    })
}

fn compose_failure(error: PipelineError) -> FailureReason {
    match error {
        PipelineError::Composition(detail)
        | PipelineError::Qr(detail)
        | PipelineError::Storage(detail) => FailureReason::Composition(detail),
        other => FailureReason::Composition(other.to_string()),
    }
}

/// Signed artifact name derived from the source file name
fn signed_output_name(source_document: &str) -> String {
    let stem = Path::new(source_document)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}_signed.pdf")
}
