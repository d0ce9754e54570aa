//! Process plumbing shared by the worker and the maintenance binaries
//!
//! The worker exposes a single `/health` route so orchestrators can probe
//! database connectivity; queue listeners run beside it and stop on the same
//! shutdown signal.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::catalog::{MarkerCatalog, ReferenceCatalog};
use crate::config::{Config, DatabaseConfig};
use crate::ingest::IngestionService;
use crate::kits::PgKitRepository;
use crate::storage::S3Storage;

/// Open the connection pool described by `config`
pub async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Apply pending schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}

/// Shared AWS configuration for the S3 and SQS clients
pub async fn aws_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Wire the ingestion service to Postgres, S3 and a freshly loaded catalog
pub async fn ingestion_service(
    pool: &PgPool,
    config: &Config,
    sdk_config: &SdkConfig,
) -> Result<IngestionService, sqlx::Error> {
    let catalog = ReferenceCatalog::load(pool).await?;
    tracing::info!(
        allowed = catalog.allowed_count(),
        masters = catalog.master_count(),
        "Reference catalog loaded"
    );
    if catalog.allowed_count() == 0 {
        tracing::warn!("Allowed-marker catalog is empty, every genotype row will be filtered out");
    }

    let repository = PgKitRepository::new(pool.clone())
        .with_batch_size(config.pipeline.breakdown_batch_size);
    let storage = S3Storage::from_config(sdk_config, &config.storage);

    Ok(IngestionService::new(
        Arc::new(repository),
        Arc::new(storage),
        Arc::new(catalog),
    ))
}

/// Health router with request tracing
pub fn router(db: PgPool) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(db)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::DEBUG)
                        .latency_unit(tower_http::LatencyUnit::Micros),
                ),
        )
}

async fn health_check(State(db): State<PgPool>) -> Result<Json<Value>, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(&db).await {
        Ok(_) => Ok(Json(json!({
            "status": "healthy",
            "database": "connected"
        }))),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
