//! Genokit worker - main entry point
//!
//! Runs the file-ready and lab-status queue listeners plus the health
//! endpoint until SIGTERM or Ctrl+C.

use anyhow::{Context, Result};
use genokit_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use genokit_server::{
    config::Config,
    ingest::StatusUpdateService,
    queue::{FileReadyHandler, LabStatusHandler, QueueConsumer, QueueListener, SqsQueue},
    server,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("genokit-worker")
        .filter_directives("genokit_server=debug,tower_http=info,sqlx=warn,aws_config=warn")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    info!("Starting genokit worker");

    let config = Config::load()?;

    let pool = server::connect_database(&config.database)
        .await
        .context("Failed to connect to database")?;
    server::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let sdk_config = server::aws_sdk_config(&config.storage.region).await;
    let ingestion = Arc::new(
        server::ingestion_service(&pool, &config, &sdk_config)
            .await
            .context("Failed to load reference catalog")?,
    );
    let status_updates = Arc::new(StatusUpdateService::new(Arc::clone(ingestion.repository())));

    let sqs = SqsQueue::client(&sdk_config, config.queue.endpoint_url.as_deref());
    let poll_config = config.queue.poll_config();
    let mut consumer = QueueConsumer::new();

    if let Some(url) = &config.queue.processing_queue_url {
        consumer = consumer.with_listener(QueueListener::new(
            Arc::new(SqsQueue::new(sqs.clone(), url)),
            Arc::new(FileReadyHandler::new(Arc::clone(&ingestion))),
            poll_config.clone(),
        ));
    }

    if let Some(url) = &config.queue.lab_status_queue_url {
        consumer = consumer.with_listener(QueueListener::new(
            Arc::new(SqsQueue::new(sqs.clone(), url)),
            Arc::new(LabStatusHandler::new(status_updates)),
            poll_config.clone(),
        ));
    }

    if consumer.is_empty() {
        warn!("No queue URLs configured, worker will only serve the health endpoint");
    }

    let cancel = CancellationToken::new();
    let listeners = consumer.start(&cancel);
    info!(listeners = listeners.len(), "Queue listeners started");

    let addr: SocketAddr = format!("{}:{}", config.health.host, config.health.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Health endpoint listening on {}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, server::router(pool.clone()))
        .with_graceful_shutdown(async move {
            server::shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    // Listeners finish the batch in hand before exiting
    let timeout = Duration::from_secs(config.health.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, futures::future::join_all(listeners))
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.health.shutdown_timeout_secs,
            "Queue listeners did not stop in time"
        );
    }

    pool.close().await;
    info!("Worker shut down gracefully");

    Ok(())
}
