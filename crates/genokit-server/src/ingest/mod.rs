//! Genotype ingestion services
//!
//! - **service**: one file in object storage -> one kit's breakdown rows
//! - **status_update**: lab-status feed messages -> kit lifecycle changes
//! - **reconcile**: force re-ingestion of every processed kit
//! - **sweep**: catch-up processing of files left under `pending/`

use thiserror::Error;

use crate::kits::RepositoryError;
use crate::storage::StorageError;

pub mod reconcile;
pub mod service;
pub mod status_update;
pub mod sweep;

pub use reconcile::{ReconcileConfig, ReconciliationJob, ReconciliationReport, ReconciliationResult};
pub use service::{IngestOutcome, IngestionService, ProcessMode, ProcessedFile};
pub use status_update::{StatusUpdate, StatusUpdateOutcome, StatusUpdateService};
pub use sweep::{PendingFileSweep, SweepReport};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("DNA file metadata missing bucket or key")]
    MissingFileLocation,
}

pub type Result<T> = std::result::Result<T, IngestError>;
