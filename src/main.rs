//! Countersign - batch document-signing pipeline

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use countersign::config::{Args, Command};
use countersign::mail::SmtpMailer;
use countersign::maintenance::{self, MaintenanceConfig};
use countersign::store::FileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("countersign={log_level},info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {e}");
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Countersign - document signing");
    info!("======================================");
    info!("Source uploads: {}", args.source_upload_dir.display());
    info!("Signed outputs: {}", args.signed_output_dir.display());
    info!("QR outputs: {}", args.qr_output_dir.display());
    info!("Batch limit: {} (chunks of {})", args.max_batch_size, args.batch_chunk_size);
    info!("Compose workers: {}", args.compose_workers);
    info!("======================================");

    let store = FileStore::new(
        args.source_upload_dir.clone(),
        args.signed_output_dir.clone(),
        args.qr_output_dir.clone(),
    );

    match args.command {
        Some(Command::Maintain) => run_maintenance(&args, &store).await,
        None => {
            error!("No subcommand given; try `countersign maintain`");
            std::process::exit(2);
        }
    }
}

async fn run_maintenance(args: &Args, store: &FileStore) -> anyhow::Result<()> {
    let config = MaintenanceConfig {
        retention_days: args.signed_retention_days as i64,
        report_recipient: args.admin_email.clone(),
    };

    let repo =
        countersign::repo::InMemoryRequestRepository::load_json(&args.request_registry).await?;
    let report = maintenance::purge_expired_artifacts(&repo, store, &config).await?;
    repo.dump_json(&args.request_registry).await?;

    info!(
        scanned = report.scanned,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "Maintenance run complete"
    );

    if config.report_recipient.is_some() {
        match args.smtp_config() {
            Some(smtp) => {
                let mailer = SmtpMailer::new(&smtp)?;
                maintenance::send_report(&mailer, &config, &report).await?;
                info!("Maintenance report sent");
            }
            None => warn!("ADMIN_EMAIL set but no mail sender configured; skipping report"),
        }
    }

    Ok(())
}
