//! Shared helpers for genokit integration tests
//!
//! - [`Pipeline`]: ingestion and status services over in-memory stores
//! - [`GenotypeFile`]: builder for genotype export text
//! - [`TestPostgres`]: PostgreSQL container with migrations applied
//!   (requires Docker; only used by `#[ignore]` tests)

#![allow(dead_code)]

use anyhow::{Context, Result};
use genokit_server::catalog::{MarkerCatalog, ReferenceCatalog};
use genokit_server::ingest::{IngestionService, StatusUpdateService};
use genokit_server::kits::{InMemoryKitRepository, KitRepository};
use genokit_server::storage::{InMemoryObjectStore, ObjectStore};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

pub const BUCKET: &str = "lab-processing";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,genokit_server=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// In-memory pipeline
// ============================================================================

pub struct Pipeline {
    pub repo: Arc<InMemoryKitRepository>,
    pub store: Arc<InMemoryObjectStore>,
    pub ingestion: Arc<IngestionService>,
    pub status: Arc<StatusUpdateService>,
}

impl Pipeline {
    pub fn new(catalog: ReferenceCatalog) -> Self {
        init_tracing();

        let repo = Arc::new(InMemoryKitRepository::new());
        let store = Arc::new(InMemoryObjectStore::new());
        let repository: Arc<dyn KitRepository> = repo.clone();
        let storage: Arc<dyn ObjectStore> = store.clone();
        let catalog: Arc<dyn MarkerCatalog> = Arc::new(catalog);

        let ingestion = Arc::new(IngestionService::new(
            Arc::clone(&repository),
            storage,
            catalog,
        ));
        let status = Arc::new(StatusUpdateService::new(repository));

        Self {
            repo,
            store,
            ingestion,
            status,
        }
    }

    /// Pipeline whose catalog allows `markers` and has no master records
    pub fn allowing(markers: &[&str]) -> Self {
        Self::new(ReferenceCatalog::allowing(markers.iter().copied()))
    }

    pub async fn upload(&self, key: &str, content: &str) {
        self.store.put(BUCKET, key, content.as_bytes().to_vec()).await;
    }
}

// ============================================================================
// Genotype file builder
// ============================================================================

/// Tab-separated genotype export in the `[Header]` / `[Data]` layout
#[derive(Debug, Clone, Default)]
pub struct GenotypeFile {
    header: Vec<(String, String)>,
    rows: Vec<String>,
}

impl GenotypeFile {
    pub fn new() -> Self {
        Self::default()
            .header("GSGT Version", "2.0.4")
            .header("processingDate", "2024-01-01")
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.header.push((key.to_string(), value.to_string()));
        self
    }

    pub fn row(
        mut self,
        sample: &str,
        marker: &str,
        chromosome: &str,
        position: &str,
        allele1: &str,
        allele2: &str,
    ) -> Self {
        self.rows.push(
            [sample, marker, chromosome, position, allele1, allele2].join("\t"),
        );
        self
    }

    /// Row written verbatim, for malformed input
    pub fn raw_row(mut self, line: &str) -> Self {
        self.rows.push(line.to_string());
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::from("[Header]\n");
        for (key, value) in &self.header {
            out.push_str(&format!("{key}\t{value}\n"));
        }
        out.push_str("[Data]\n");
        out.push_str("Sample ID\tSNP Name\tChr\tPosition\tAllele1 - Forward\tAllele2 - Forward\n");
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
