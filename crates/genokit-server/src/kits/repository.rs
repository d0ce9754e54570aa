//! Persistence contract for kits

use async_trait::async_trait;
use thiserror::Error;

use super::models::{
    BreakdownCounts, BreakdownRow, Kit, NewActivity, NewKit, NewPatientActivity,
    ProcessedUpdate, StatusChange,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Kit {0} not found")]
    KitNotFound(i64),

    #[error("Kit with barcode {0} could not be created or found")]
    CreateConflict(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Operations the ingestion pipeline issues against the kit store.
///
/// Lookups only ever see non-deleted kits.
#[async_trait]
pub trait KitRepository: Send + Sync {
    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Kit>>;

    /// Insert a kit. If a live kit with the barcode already exists (for
    /// example a concurrent insert won), return it instead. The flag is
    /// true when this call inserted the row.
    async fn create_kit(&self, kit: NewKit) -> Result<(Kit, bool)>;

    /// Delete every breakdown row of the kit and insert `rows` in one
    /// transaction. Rows repeating a marker id are skipped. Returns the
    /// number of rows inserted.
    async fn replace_breakdown(&self, kit_id: i64, rows: &[BreakdownRow]) -> Result<u64>;

    /// Set processed, clear failure, set status, merge file metadata
    async fn mark_processed(&self, kit_id: i64, update: ProcessedUpdate) -> Result<Kit>;

    /// Record a processing failure without touching status
    async fn mark_failed(&self, kit_id: i64, reason: &str) -> Result<()>;

    /// Set status and failure flags unless the kit is already at
    /// `GENOTYPING_ACCEPTED`. The check and the write are one statement.
    /// Returns false when the guard kept the kit unchanged.
    async fn apply_status(&self, kit_id: i64, change: StatusChange) -> Result<bool>;

    async fn append_activity(&self, activity: NewActivity) -> Result<()>;

    async fn append_patient_activity(&self, activity: NewPatientActivity) -> Result<()>;

    async fn breakdown_counts(&self, kit_id: i64) -> Result<BreakdownCounts>;

    /// Live processed kits, oldest first
    async fn list_processed_kits(&self) -> Result<Vec<Kit>>;

    /// Existing live kit for the barcode, or a newly created one
    async fn find_or_create(&self, kit: NewKit) -> Result<(Kit, bool)> {
        if let Some(existing) = self.find_by_barcode(&kit.barcode).await? {
            return Ok((existing, false));
        }
        self.create_kit(kit).await
    }
}
