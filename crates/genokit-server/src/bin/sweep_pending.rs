//! Process genotype files still waiting under `pending/`
//!
//! Picks up files whose queue notification was lost:
//!
//! ```text
//! sweep-pending --bucket lab-processing
//! sweep-pending --dry-run
//! ```
//!
//! The bucket defaults to `S3_LAB_PROCESSING_BUCKET`. Files of kits that are
//! already processed are left alone by the ingestion service.

use anyhow::{Context, Result};
use clap::Parser;
use genokit_common::logging::{init_logging, LogConfig};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use genokit_server::{
    config::Config,
    ingest::{sweep::DEFAULT_SWEEP_PAUSE, PendingFileSweep},
    server,
};

#[derive(Debug, Parser)]
#[command(name = "sweep-pending", about = "Process genotype files left under pending/")]
struct Args {
    /// Bucket to sweep
    #[arg(long, env = "S3_LAB_PROCESSING_BUCKET")]
    bucket: Option<String>,

    /// Pause between files in milliseconds
    #[arg(long)]
    pause_ms: Option<u64>,

    /// List pending files without processing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = LogConfig::builder()
        .log_file_prefix("sweep-pending")
        .filter_directives("genokit_server=info,sqlx=warn,aws_config=warn")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let config = Config::load()?;
    let bucket = args
        .bucket
        .or_else(|| config.pipeline.lab_processing_bucket.clone())
        .context("No bucket given: pass --bucket or set S3_LAB_PROCESSING_BUCKET")?;
    let pause = args
        .pause_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_SWEEP_PAUSE);

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

    let sweep = PendingFileSweep::new(Arc::new(ingestion), pause);

    if args.dry_run {
        let keys = sweep.pending_keys(&bucket).await?;
        info!(bucket = %bucket, files = keys.len(), "Dry run, no files will be processed");
        for key in &keys {
            info!(key = %key, "Would process pending file");
        }
        return Ok(());
    }

    let report = sweep.run(&bucket).await?;

    info!(
        bucket = %bucket,
        total = report.total,
        successful = report.successful,
        failed = report.failed,
        "Pending file sweep completed"
    );

    for failed in report.results.iter().filter(|r| !r.success) {
        warn!(
            key = %failed.key,
            error = failed.error.as_deref().unwrap_or("unknown"),
            "Pending file could not be processed"
        );
    }

    pool.close().await;

    if report.failed > 0 {
        anyhow::bail!("{} of {} pending files failed", report.failed, report.total);
    }

    Ok(())
}
