//! Rebuild breakdown rows of every processed kit against the current
//! reference catalog.
//!
//! Run after the catalog seeding process adds or removes markers:
//!
//! ```text
//! reconcile-breakdowns --batch-size 10 --pause-ms 1000
//! reconcile-breakdowns --dry-run
//! ```
//!
//! Reads the same environment as the worker (`DATABASE_URL`, `S3_*`,
//! `AWS_REGION`). Exits non-zero when any kit failed.

use anyhow::{Context, Result};
use clap::Parser;
use genokit_common::logging::{init_logging, LogConfig};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use genokit_server::{config::Config, ingest::ReconciliationJob, server};

#[derive(Debug, Parser)]
#[command(name = "reconcile-breakdowns", about = "Reconcile kit breakdowns with the reference catalog")]
struct Args {
    /// Kits reconciled concurrently
    #[arg(long, env = "RECONCILE_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long, env = "RECONCILE_BATCH_PAUSE_MS")]
    pause_ms: Option<u64>,

    /// List the kits that would be reconciled without touching them
    #[arg(long)]
    dry_run: bool,

    /// Print the full report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = LogConfig::builder()
        .log_file_prefix("reconcile-breakdowns")
        .filter_directives("genokit_server=info,sqlx=warn,aws_config=warn")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let config = Config::load()?;
    let mut reconcile_config = config.pipeline.reconcile_config();
    if let Some(batch_size) = args.batch_size {
        reconcile_config.batch_size = batch_size.max(1);
    }
    if let Some(pause_ms) = args.pause_ms {
        reconcile_config.batch_pause = Duration::from_millis(pause_ms);
    }

    let pool = server::connect_database(&config.database)
        .await
        .context("Failed to connect to database")?;
    server::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let sdk_config = server::aws_sdk_config(&config.storage.region).await;
    let ingestion = server::ingestion_service(&pool, &config, &sdk_config)
        .await
        .context("Failed to load reference catalog")?;

    let job = ReconciliationJob::new(Arc::new(ingestion), reconcile_config);

    if args.dry_run {
        let kits = job.candidates().await?;
        info!(total_kits = kits.len(), "Dry run, no kits will be reconciled");
        for kit in &kits {
            info!(
                kit_id = kit.id,
                barcode = %kit.barcode,
                file_metadata = %kit.file_metadata,
                "Would reconcile kit"
            );
        }
        return Ok(());
    }

    let report = job.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    for failed in report.results.iter().filter(|r| !r.success) {
        warn!(
            kit_id = failed.kit_id,
            barcode = %failed.barcode,
            error = failed.error.as_deref().unwrap_or("unknown"),
            "Kit could not be reconciled"
        );
    }

    pool.close().await;

    if report.failed > 0 {
        anyhow::bail!("{} of {} kits failed to reconcile", report.failed, report.total_kits);
    }

    Ok(())
}
