//! Batch signing pipeline integration tests
//!
//! Exercises the orchestrator end to end against in-memory repositories,
//! a temp-dir file store, and a recording mail transport:
//! - happy-path batches and per-item failure isolation
//! - idempotence of already-signed items
//! - chunk-level commit isolation
//! - aggregated completion notifications

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;
use uuid::Uuid;

use countersign::batch::{BatchOrchestrator, OrchestratorConfig};
use countersign::compose::SignatureCompositor;
use countersign::domain::{
    RequestCategory, RequestStatus, RequestorSnapshot, SignerProfile, SigningRequest,
};
use countersign::mail::RecordingMailer;
use countersign::notify::{NotificationDispatcher, NotifyConfig};
use countersign::provenance::{QrConfig, QrGenerator};
use countersign::repo::{
    InMemoryRequestRepository, InMemorySignerRepository, RequestRepository, StagedSigning,
};
use countersign::store::{FileStore, StorageRoot};
use countersign::types::{PipelineError, Result};

// =============================================================================
// Fixtures
// =============================================================================

fn fixture_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for index in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name("F1".into()), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Page {}", index + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

struct Harness<R> {
    _dir: TempDir,
    store: FileStore,
    requests: Arc<R>,
    signers: Arc<InMemorySignerRepository>,
    mailer: Arc<RecordingMailer>,
    orchestrator: BatchOrchestrator<R, InMemorySignerRepository>,
}

async fn harness_with<R>(requests: Arc<R>, config: OrchestratorConfig) -> Harness<R>
where
    R: RequestRepository + 'static,
{
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(
        dir.path().join("uploads"),
        dir.path().join("signed"),
        dir.path().join("qr"),
    );

    // Signature image on file for the default signer
    let signature_path = dir.path().join("uploads").join("signatures/sig.png");
    std::fs::create_dir_all(signature_path.parent().unwrap()).unwrap();
    image::RgbImage::from_pixel(40, 20, image::Rgb([10, 10, 80]))
        .save(&signature_path)
        .unwrap();

    let signers = Arc::new(InMemorySignerRepository::new());
    signers
        .insert(SignerProfile {
            id: "lecturer-1".to_string(),
            display_name: "Dr. Jane Smith".to_string(),
            title: "Head of Department".to_string(),
            signature_image: Some("signatures/sig.png".to_string()),
        })
        .await;

    let mailer = Arc::new(RecordingMailer::new());
    let notify_config = NotifyConfig {
        batch_pause: Duration::from_millis(5),
        ..NotifyConfig::default()
    };
    let notifications = NotificationDispatcher::spawn(notify_config, Arc::clone(&mailer));

    let orchestrator = BatchOrchestrator::new(
        config,
        Arc::clone(&requests),
        Arc::clone(&signers),
        store.clone(),
        QrGenerator::new(QrConfig::default(), store.clone()),
        SignatureCompositor::new(store.clone()),
        notifications,
    );

    Harness {
        _dir: dir,
        store,
        requests,
        signers,
        mailer,
        orchestrator,
    }
}

async fn harness(config: OrchestratorConfig) -> Harness<InMemoryRequestRepository> {
    harness_with(Arc::new(InMemoryRequestRepository::new()), config).await
}

fn quick_config() -> OrchestratorConfig {
    OrchestratorConfig {
        chunk_interval: Duration::from_millis(5),
        ..OrchestratorConfig::default()
    }
}

/// Seed one pending request with its source document on disk
async fn seed_request<R: RequestRepository>(
    harness: &Harness<R>,
    repo: &InMemoryRequestRepository,
    index: usize,
    email: &str,
) -> Uuid {
    let source = format!("requests/req{index}.pdf");
    harness
        .store
        .write_atomic(StorageRoot::SourceUploads, &source, &fixture_pdf(2))
        .await
        .unwrap();

    let request = SigningRequest::new(
        format!("Request {index}"),
        RequestCategory::Endorsement,
        RequestorSnapshot {
            id: format!("student-{email}"),
            display_name: format!("Student {email}"),
            registration_number: Some(format!("6720{index:04}")),
            email: Some(email.to_string()),
        },
        "lecturer-1".to_string(),
        Some(source),
    );
    let id = request.id;
    repo.insert(request).await;
    id
}

async fn wait_for_mail(mailer: &RecordingMailer, expected: usize) {
    for _ in 0..200 {
        if mailer.sent_count().await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} notification(s), got {}", mailer.sent_count().await);
}

// =============================================================================
// Batch outcomes
// =============================================================================

#[tokio::test]
async fn test_all_valid_batch_signs_everything() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    let mut ids = Vec::new();
    for index in 0..3 {
        ids.push(seed_request(&harness, &repo, index, "alice@example.edu").await);
    }

    let outcome = harness
        .orchestrator
        .sign_batch(ids.clone(), "lecturer-1")
        .await
        .unwrap();

    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.success.len(), 3);
    assert!(outcome.failed.is_empty());

    for (index, id) in ids.iter().enumerate() {
        let request = repo.get(*id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Signed);
        assert!(request.signed_at.is_some());
        assert_eq!(
            request.signed_document.as_deref(),
            Some(format!("req{index}_signed.pdf").as_str())
        );
        assert_eq!(
            request.qr_code.as_deref(),
            Some(format!("qr_{id}.png").as_str())
        );
        assert!(request.qr_data.is_some());

        // Artifacts exist, consumed uploads are gone
        assert!(
            harness
                .store
                .exists(StorageRoot::SignedOutputs, request.signed_document.as_ref().unwrap())
                .await
        );
        assert!(
            harness
                .store
                .exists(StorageRoot::QrOutputs, request.qr_code.as_ref().unwrap())
                .await
        );
        assert!(
            !harness
                .store
                .exists(StorageRoot::SourceUploads, &format!("requests/req{index}.pdf"))
                .await
        );
    }
}

#[tokio::test]
async fn test_unknown_id_fails_alone() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    let known = seed_request(&harness, &repo, 0, "alice@example.edu").await;
    let unknown = Uuid::new_v4();

    let outcome = harness
        .orchestrator
        .sign_batch(vec![known, unknown], "lecturer-1")
        .await
        .unwrap();

    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.success.len(), 1);
    assert_eq!(outcome.success[0].id, known);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].id, unknown);
    assert_eq!(outcome.failed[0].reason.to_string(), "not found");
}

#[tokio::test]
async fn test_resigning_is_a_state_conflict_not_a_second_artifact() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    let id = seed_request(&harness, &repo, 0, "alice@example.edu").await;

    let first = harness
        .orchestrator
        .sign_batch(vec![id], "lecturer-1")
        .await
        .unwrap();
    assert_eq!(first.success.len(), 1);
    let signed_at = repo.get(id).await.unwrap().signed_at;

    let second = harness
        .orchestrator
        .sign_batch(vec![id], "lecturer-1")
        .await
        .unwrap();
    assert!(second.success.is_empty());
    assert_eq!(second.failed.len(), 1);
    assert_eq!(
        second.failed[0].reason.to_string(),
        "cannot sign (status: signed)"
    );

    // The original artifact is untouched
    assert_eq!(repo.get(id).await.unwrap().signed_at, signed_at);
}

#[tokio::test]
async fn test_foreign_request_is_unauthorized() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    harness
        .signers
        .insert(SignerProfile {
            id: "lecturer-2".to_string(),
            display_name: "Dr. Other".to_string(),
            title: "Lecturer".to_string(),
            signature_image: Some("signatures/sig.png".to_string()),
        })
        .await;

    let id = seed_request(&harness, &repo, 0, "alice@example.edu").await;

    let outcome = harness
        .orchestrator
        .sign_batch(vec![id], "lecturer-2")
        .await
        .unwrap();

    assert!(outcome.success.is_empty());
    assert_eq!(
        outcome.failed[0].reason.to_string(),
        "not assigned to this signer"
    );
    assert_eq!(repo.get(id).await.unwrap().status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_missing_source_document_fails_item() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    let request = SigningRequest::new(
        "No file".to_string(),
        RequestCategory::Endorsement,
        RequestorSnapshot {
            id: "student-1".to_string(),
            display_name: "Alice".to_string(),
            registration_number: None,
            email: None,
        },
        "lecturer-1".to_string(),
        None,
    );
    let id = request.id;
    repo.insert(request).await;

    let outcome = harness
        .orchestrator
        .sign_batch(vec![id], "lecturer-1")
        .await
        .unwrap();

    assert_eq!(
        outcome.failed[0].reason.to_string(),
        "no source document attached"
    );
}

// =============================================================================
// Top-level admission checks
// =============================================================================

#[tokio::test]
async fn test_signer_without_signature_aborts_whole_call() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    harness
        .signers
        .insert(SignerProfile {
            id: "unsigned-lecturer".to_string(),
            display_name: "Dr. Unready".to_string(),
            title: "Lecturer".to_string(),
            signature_image: None,
        })
        .await;

    let id = seed_request(&harness, &repo, 0, "alice@example.edu").await;
    // Make the request belong to the signature-less signer
    let mut request = repo.get(id).await.unwrap();
    request.signer_id = "unsigned-lecturer".to_string();
    repo.insert(request).await;

    let result = harness
        .orchestrator
        .sign_batch(vec![id], "unsigned-lecturer")
        .await;

    assert!(matches!(result, Err(PipelineError::SignatureMissing(_))));
    // No partial outcome: nothing changed
    assert_eq!(repo.get(id).await.unwrap().status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_oversized_batch_is_rejected_outright() {
    let harness = harness(quick_config()).await;

    let ids: Vec<Uuid> = (0..101).map(|_| Uuid::new_v4()).collect();
    let result = harness.orchestrator.sign_batch(ids, "lecturer-1").await;

    assert!(matches!(
        result,
        Err(PipelineError::BatchTooLarge { given: 101, limit: 100 })
    ));
}

// =============================================================================
// Chunk isolation
// =============================================================================

/// Repository wrapper that fails the nth grouped commit
struct FailingCommitRepo {
    inner: InMemoryRequestRepository,
    fail_on_call: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl RequestRepository for FailingCommitRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<SigningRequest>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<SigningRequest>> {
        self.inner.find_by_ids(ids).await
    }

    async fn commit_signed(&self, staged: &[StagedSigning]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(PipelineError::Repository("connection reset".to_string()));
        }
        self.inner.commit_signed(staged).await
    }

    async fn commit_rejection(
        &self,
        id: Uuid,
        comment: &str,
        rejected_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.commit_rejection(id, comment, rejected_at).await
    }

    async fn find_signed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SigningRequest>> {
        self.inner.find_signed_before(cutoff).await
    }

    async fn expire_artifacts(&self, ids: &[Uuid]) -> Result<()> {
        self.inner.expire_artifacts(ids).await
    }
}

#[tokio::test]
async fn test_failed_chunk_commit_degrades_only_its_chunk() {
    let repo = Arc::new(FailingCommitRepo {
        inner: InMemoryRequestRepository::new(),
        fail_on_call: 2,
        calls: AtomicUsize::new(0),
    });
    let harness = harness_with(Arc::clone(&repo), quick_config()).await;

    let mut ids = Vec::new();
    for index in 0..25 {
        ids.push(seed_request(&harness, &repo.inner, index, "alice@example.edu").await);
    }

    let outcome = harness
        .orchestrator
        .sign_batch(ids.clone(), "lecturer-1")
        .await
        .unwrap();

    // Chunks of 10: chunk 1 committed, chunk 2 degraded, chunk 3 committed
    assert_eq!(outcome.total, 25);
    assert_eq!(outcome.success.len(), 15);
    assert_eq!(outcome.failed.len(), 10);
    for failure in &outcome.failed {
        assert_eq!(failure.reason.to_string(), "commit failure");
        assert!(ids[10..20].contains(&failure.id));
    }

    // Chunk 1 stayed committed, chunk 2 retained nothing, chunk 3 ran
    assert_eq!(repo.inner.count_in_status(RequestStatus::Signed).await, 15);
    for id in &ids[10..20] {
        let request = repo.inner.get(*id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.signed_document.is_none());
    }
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_recipients_get_one_aggregated_notice_each() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    // Alice files two requests, Bob one
    let ids = vec![
        seed_request(&harness, &repo, 0, "alice@example.edu").await,
        seed_request(&harness, &repo, 1, "alice@example.edu").await,
        seed_request(&harness, &repo, 2, "bob@example.edu").await,
    ];

    let outcome = harness
        .orchestrator
        .sign_batch(ids, "lecturer-1")
        .await
        .unwrap();
    assert_eq!(outcome.success.len(), 3);

    wait_for_mail(&harness.mailer, 2).await;
    let sent = harness.mailer.sent().await;
    assert_eq!(sent.len(), 2);

    let alice = sent.iter().find(|m| m.to == "alice@example.edu").unwrap();
    assert!(alice.subject.starts_with("2 request(s) signed"));
    assert!(alice.text_body.contains("Request 0"));
    assert!(alice.text_body.contains("Request 1"));
    assert!(alice.text_body.contains("Dr. Jane Smith"));

    let bob = sent.iter().find(|m| m.to == "bob@example.edu").unwrap();
    assert!(bob.subject.starts_with("1 request(s) signed"));
    assert!(bob.text_body.contains("Request 2"));
}

// =============================================================================
// Single-item operations
// =============================================================================

#[tokio::test]
async fn test_sign_one_maps_item_refusal_to_error() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    let id = seed_request(&harness, &repo, 0, "alice@example.edu").await;

    let signed = harness.orchestrator.sign_one(id, "lecturer-1").await.unwrap();
    assert_eq!(signed.id, id);

    let again = harness.orchestrator.sign_one(id, "lecturer-1").await;
    assert!(matches!(
        again,
        Err(PipelineError::ItemRefused { id: refused, .. }) if refused == id
    ));
}

#[tokio::test]
async fn test_reject_records_comment_and_notifies() {
    let harness = harness(quick_config()).await;
    let repo = Arc::clone(&harness.requests);

    let id = seed_request(&harness, &repo, 0, "alice@example.edu").await;

    harness
        .orchestrator
        .reject(id, "lecturer-1", "Wrong template")
        .await
        .unwrap();

    let request = repo.get(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Rejected);
    assert_eq!(request.rejection_comment.as_deref(), Some("Wrong template"));
    assert!(request.rejected_at.is_some());

    // The consumed upload is freed
    assert!(
        !harness
            .store
            .exists(StorageRoot::SourceUploads, "requests/req0.pdf")
            .await
    );

    wait_for_mail(&harness.mailer, 1).await;
    let sent = harness.mailer.sent().await;
    assert!(sent[0].subject.starts_with("Request rejected"));
    assert!(sent[0].text_body.contains("Wrong template"));

    // A rejected request cannot be rejected again
    let again = harness.orchestrator.reject(id, "lecturer-1", "again").await;
    assert!(matches!(again, Err(PipelineError::ItemRefused { .. })));
}
