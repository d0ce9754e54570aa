//! Kits: lifecycle states, persistence, and the activity log
//!
//! A kit is keyed by its barcode, which equals the sample id inside the
//! genotype file. All persistence goes through [`KitRepository`] so the
//! ingestion services run unchanged against Postgres or in memory.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod status;

pub use memory::InMemoryKitRepository;
pub use models::{
    merge_metadata, Activity, BreakdownCounts, BreakdownRow, FileMetadata, Kit, NewActivity,
    NewKit, NewPatientActivity, ProcessedUpdate, StatusChange,
};
pub use postgres::PgKitRepository;
pub use repository::{KitRepository, RepositoryError, Result};
pub use status::{
    describe_feed_status, is_failed_status, map_external_status, status_message, KitStatus,
};

/// Rows per insert round-trip when replacing a breakdown
pub const DEFAULT_BREAKDOWN_BATCH_SIZE: usize = 1000;
