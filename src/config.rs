//! Configuration for Countersign
//!
//! CLI arguments and environment variable handling using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::batch::OrchestratorConfig;
use crate::mail::SmtpConfig;
use crate::notify::NotifyConfig;

/// Countersign - batch document-signing pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "countersign")]
#[command(about = "Batch document-signing pipeline with QR provenance")]
pub struct Args {
    /// Root directory for source document uploads
    #[arg(long, env = "SOURCE_UPLOAD_DIR", default_value = "uploads")]
    pub source_upload_dir: PathBuf,

    /// Root directory for signed output documents
    #[arg(long, env = "SIGNED_OUTPUT_DIR", default_value = "storage/signed")]
    pub signed_output_dir: PathBuf,

    /// Root directory for generated QR rasters
    #[arg(long, env = "QR_OUTPUT_DIR", default_value = "uploads/qr_codes")]
    pub qr_output_dir: PathBuf,

    /// Hard limit on the number of items accepted per batch call
    #[arg(long, env = "MAX_BATCH_SIZE", default_value = "100")]
    pub max_batch_size: usize,

    /// Items per chunk; one grouped commit per chunk
    #[arg(long, env = "BATCH_CHUNK_SIZE", default_value = "10")]
    pub batch_chunk_size: usize,

    /// Upper bound on concurrent composition workers within a chunk
    #[arg(long, env = "COMPOSE_WORKERS", default_value = "10")]
    pub compose_workers: usize,

    /// Pause between chunks in milliseconds
    #[arg(long, env = "CHUNK_INTERVAL_MS", default_value = "200")]
    pub chunk_interval_ms: u64,

    /// Worker cap for the small parallel notification strategy
    #[arg(long, env = "NOTIFY_WORKERS_SMALL", default_value = "5")]
    pub notify_workers_small: usize,

    /// Worker cap for the large parallel notification strategy
    #[arg(long, env = "NOTIFY_WORKERS_LARGE", default_value = "10")]
    pub notify_workers_large: usize,

    /// Recipients per sub-batch in the paced notification strategy
    #[arg(long, env = "NOTIFY_SUB_BATCH_SIZE", default_value = "20")]
    pub notify_sub_batch_size: usize,

    /// Pause between notification sub-batches in milliseconds
    #[arg(long, env = "NOTIFY_BATCH_PAUSE_MS", default_value = "1000")]
    pub notify_batch_pause_ms: u64,

    /// Per-recipient send timeout in the parallel and paced strategies,
    /// in milliseconds
    #[arg(long, env = "NOTIFY_SEND_TIMEOUT_MS", default_value = "30000")]
    pub notify_send_timeout_ms: u64,

    /// Time-to-live for pending verification credentials, in seconds
    #[arg(long, env = "CREDENTIAL_TTL_SECONDS", default_value = "600")]
    pub credential_ttl_seconds: u64,

    /// Retention window for signed artifacts, in days
    #[arg(long, env = "SIGNED_RETENTION_DAYS", default_value = "60")]
    pub signed_retention_days: u64,

    /// Recipient for maintenance reports (optional)
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    /// JSON snapshot of the request registry used by the maintain
    /// subcommand
    #[arg(long, env = "REQUEST_REGISTRY", default_value = "storage/requests.json")]
    pub request_registry: PathBuf,

    /// SMTP server hostname
    #[arg(long, env = "MAIL_SERVER", default_value = "smtp.gmail.com")]
    pub mail_server: String,

    /// SMTP server port
    #[arg(long, env = "MAIL_PORT", default_value = "587")]
    pub mail_port: u16,

    /// SMTP username (optional; unauthenticated relay when absent)
    #[arg(long, env = "MAIL_USERNAME")]
    pub mail_username: Option<String>,

    /// SMTP password
    #[arg(long, env = "MAIL_PASSWORD")]
    pub mail_password: Option<String>,

    /// Sender address for outbound mail; falls back to the username
    #[arg(long, env = "MAIL_DEFAULT_SENDER")]
    pub mail_default_sender: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operational subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Purge signed artifacts past the retention window and mail a report
    Maintain,
}

impl Args {
    /// Get effective sender address (falls back to the SMTP username)
    pub fn sender_address(&self) -> Option<String> {
        self.mail_default_sender
            .clone()
            .or_else(|| self.mail_username.clone())
    }

    /// Orchestrator configuration derived from the arguments
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_batch_size: self.max_batch_size,
            chunk_size: self.batch_chunk_size,
            compose_workers: self.compose_workers,
            chunk_interval: Duration::from_millis(self.chunk_interval_ms),
        }
    }

    /// Notification configuration derived from the arguments
    pub fn notify_config(&self) -> NotifyConfig {
        NotifyConfig {
            small_pool_workers: self.notify_workers_small,
            large_pool_workers: self.notify_workers_large,
            sub_batch_size: self.notify_sub_batch_size,
            batch_pause: Duration::from_millis(self.notify_batch_pause_ms),
            send_timeout: Duration::from_millis(self.notify_send_timeout_ms),
            ..NotifyConfig::default()
        }
    }

    /// SMTP configuration derived from the arguments, when a sender is set
    pub fn smtp_config(&self) -> Option<SmtpConfig> {
        let sender = self.sender_address()?;
        Some(SmtpConfig {
            host: self.mail_server.clone(),
            port: self.mail_port,
            username: self.mail_username.clone(),
            password: self.mail_password.clone(),
            sender,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("MAX_BATCH_SIZE must be at least 1".to_string());
        }

        if self.batch_chunk_size == 0 {
            return Err("BATCH_CHUNK_SIZE must be at least 1".to_string());
        }

        if self.batch_chunk_size > self.max_batch_size {
            return Err(
                "BATCH_CHUNK_SIZE must not exceed MAX_BATCH_SIZE".to_string(),
            );
        }

        if self.compose_workers == 0 {
            return Err("COMPOSE_WORKERS must be at least 1".to_string());
        }

        if self.notify_workers_small == 0
            || self.notify_workers_large == 0
            || self.notify_sub_batch_size == 0
        {
            return Err("Notification worker caps and sub-batch size must be at least 1".to_string());
        }

        if self.mail_username.is_some() && self.mail_password.is_none() {
            return Err("MAIL_PASSWORD is required when MAIL_USERNAME is set".to_string());
        }

        Ok(())
    }
}
