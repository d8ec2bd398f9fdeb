//! Retention maintenance
//!
//! Signed artifacts are kept for a bounded window; past it the files are
//! deleted and their stored references marked expired in one grouped
//! repository call. An optional admin report summarizes each run.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::mail::{MailMessage, MailTransport};
use crate::repo::RequestRepository;
use crate::store::{FileStore, StorageRoot};
use crate::types::Result;

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Days a signed artifact is retained after signing
    pub retention_days: i64,
    /// Recipient for run reports, when configured
    pub report_recipient: Option<String>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retention_days: 60,
            report_recipient: None,
        }
    }
}

/// One purged artifact
#[derive(Debug, Clone)]
pub struct PurgedArtifact {
    pub id: Uuid,
    pub title: String,
    pub artifact: String,
    pub signed_at: Option<DateTime<Utc>>,
}

/// One artifact that could not be purged
#[derive(Debug, Clone)]
pub struct FailedPurge {
    pub id: Uuid,
    pub artifact: String,
    pub error: String,
}

/// Outcome of one maintenance run
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    /// Requests inspected
    pub scanned: usize,
    /// Artifacts deleted and expired
    pub deleted: Vec<PurgedArtifact>,
    /// Artifacts whose deletion failed; their references stay live
    pub failed: Vec<FailedPurge>,
}

/// Delete signed artifacts older than the retention window and expire
/// their references
///
/// A file already missing on disk still gets its reference expired; a
/// deletion error leaves the reference live for the next run.
pub async fn purge_expired_artifacts<R: RequestRepository>(
    repo: &R,
    store: &FileStore,
    config: &MaintenanceConfig,
) -> Result<MaintenanceReport> {
    let cutoff = Utc::now() - Duration::days(config.retention_days);
    let aged = repo.find_signed_before(cutoff).await?;

    info!(
        cutoff = %cutoff,
        candidates = aged.len(),
        "Starting retention sweep"
    );

    let mut report = MaintenanceReport {
        scanned: aged.len(),
        ..Default::default()
    };
    let mut expired_ids = Vec::new();

    for request in aged {
        let Some(artifact) = request.signed_document.clone() else {
            continue;
        };

        if store.exists(StorageRoot::SignedOutputs, &artifact).await {
            if let Err(e) = store.delete(StorageRoot::SignedOutputs, &artifact).await {
                warn!(request = %request.id, artifact = %artifact, error = %e, "Purge failed");
                report.failed.push(FailedPurge {
                    id: request.id,
                    artifact,
                    error: e.to_string(),
                });
                continue;
            }
        } else {
            warn!(request = %request.id, artifact = %artifact, "Artifact already missing; expiring reference");
        }

        expired_ids.push(request.id);
        report.deleted.push(PurgedArtifact {
            id: request.id,
            title: request.title.clone(),
            artifact,
            signed_at: request.signed_at,
        });
    }

    if !expired_ids.is_empty() {
        repo.expire_artifacts(&expired_ids).await?;
    }

    info!(
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "Retention sweep finished"
    );

    Ok(report)
}

/// Render the admin report for one run
pub fn report_message(recipient: &str, report: &MaintenanceReport) -> MailMessage {
    let now = Utc::now();
    let subject = format!("Maintenance report - {}", now.format("%d %b %Y"));

    let mut text_deleted = String::new();
    for item in &report.deleted {
        let signed = item
            .signed_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        text_deleted.push_str(&format!("- {} ({}, signed {signed})\n", item.artifact, item.id));
    }

    let mut text_failed = String::new();
    for item in &report.failed {
        text_failed.push_str(&format!("- {} ({}): {}\n", item.artifact, item.id, item.error));
    }

    let text_body = format!(
        "Retention sweep finished.\n\n\
         Scanned: {scanned}\n\
         Deleted: {deleted}\n\
         Failed: {failed}\n\n\
         {deleted_section}{failed_section}",
        scanned = report.scanned,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        deleted_section = if text_deleted.is_empty() {
            String::new()
        } else {
            format!("Deleted artifacts:\n{text_deleted}\n")
        },
        failed_section = if text_failed.is_empty() {
            String::new()
        } else {
            format!("Failed deletions:\n{text_failed}\n")
        },
    );

    let html_body = format!(
        "<html><body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <h2>Maintenance report</h2>\
         <table style=\"border-collapse: collapse;\">\
         <tr><td style=\"padding:4px 12px;\">Scanned</td><td>{scanned}</td></tr>\
         <tr><td style=\"padding:4px 12px;\">Deleted</td><td>{deleted}</td></tr>\
         <tr><td style=\"padding:4px 12px;\">Failed</td><td>{failed}</td></tr>\
         </table>\
         <p style=\"font-size:12px; color:#9ca3af;\">Automated maintenance run - {date}</p>\
         </body></html>",
        scanned = report.scanned,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        date = now.format("%A, %d %B %Y"),
    );

    MailMessage {
        to: recipient.to_string(),
        subject,
        text_body,
        html_body,
    }
}

/// Send the run report when a recipient is configured
pub async fn send_report<M: MailTransport>(
    transport: &M,
    config: &MaintenanceConfig,
    report: &MaintenanceReport,
) -> Result<()> {
    let Some(recipient) = &config.report_recipient else {
        return Ok(());
    };
    transport.send(&report_message(recipient, report)).await
}
