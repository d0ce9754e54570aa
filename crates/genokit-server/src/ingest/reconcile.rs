//! Breakdown reconciliation after reference catalog changes
//!
//! Re-runs ingestion in force mode for every processed kit so breakdown
//! rows pick up markers added to (or removed from) the catalog. Kits are
//! handled in small concurrent batches with a pause in between to bound
//! load on storage and the database. One kit failing never stops the run.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::service::{IngestionService, ProcessMode};
use super::{IngestError, Result};
use crate::kits::Kit;
use crate::storage::completed_key;

pub const DEFAULT_RECONCILE_BATCH_SIZE: usize = 10;
pub const DEFAULT_RECONCILE_BATCH_PAUSE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
            batch_pause: DEFAULT_RECONCILE_BATCH_PAUSE,
        }
    }
}

/// Outcome for one kit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub kit_id: i64,
    pub barcode: String,
    pub success: bool,
    pub old_breakdown_count: u64,
    pub new_breakdown_count: u64,
    /// New rows linked to a master-marker record
    pub matched_master_markers: u64,
    pub error: Option<String>,
}

impl ReconciliationResult {
    fn for_kit(kit: &Kit) -> Self {
        Self {
            kit_id: kit.id,
            barcode: kit.barcode.clone(),
            success: false,
            old_breakdown_count: 0,
            new_breakdown_count: 0,
            matched_master_markers: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub total_kits: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_old_breakdowns: u64,
    pub total_new_breakdowns: u64,
    pub total_matched: u64,
    pub results: Vec<ReconciliationResult>,
}

impl ReconciliationReport {
    fn from_results(results: Vec<ReconciliationResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total_kits: results.len(),
            successful,
            failed: results.len() - successful,
            total_old_breakdowns: results.iter().map(|r| r.old_breakdown_count).sum(),
            total_new_breakdowns: results.iter().map(|r| r.new_breakdown_count).sum(),
            total_matched: results.iter().map(|r| r.matched_master_markers).sum(),
            results,
        }
    }
}

pub struct ReconciliationJob {
    ingestion: Arc<IngestionService>,
    config: ReconcileConfig,
}

impl ReconciliationJob {
    pub fn new(ingestion: Arc<IngestionService>, config: ReconcileConfig) -> Self {
        Self { ingestion, config }
    }

    /// Kits a run would reconcile, oldest first
    pub async fn candidates(&self) -> Result<Vec<Kit>> {
        Ok(self.ingestion.repository().list_processed_kits().await?)
    }

    #[instrument(skip(self), fields(trace_id = %uuid::Uuid::new_v4()))]
    pub async fn run(&self) -> Result<ReconciliationReport> {
        info!("Starting reconciliation of processed kits against the reference catalog");

        let kits = self.candidates().await?;
        if kits.is_empty() {
            info!("No processed kits found to reconcile");
            return Ok(ReconciliationReport::default());
        }

        let batch_size = self.config.batch_size.max(1);
        let total_batches = kits.len().div_ceil(batch_size);
        info!(total_kits = kits.len(), total_batches, "Found processed kits to reconcile");

        let mut results = Vec::with_capacity(kits.len());

        for (batch_idx, batch) in kits.chunks(batch_size).enumerate() {
            info!(
                batch = batch_idx + 1,
                total_batches,
                kits = batch.len(),
                "Reconciling batch"
            );

            results.extend(join_all(batch.iter().map(|kit| self.reconcile_kit(kit))).await);

            if batch_idx + 1 < total_batches && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        let report = ReconciliationReport::from_results(results);

        info!(
            total_kits = report.total_kits,
            successful = report.successful,
            failed = report.failed,
            total_old_breakdowns = report.total_old_breakdowns,
            total_new_breakdowns = report.total_new_breakdowns,
            total_matched = report.total_matched,
            "Reconciliation completed"
        );

        Ok(report)
    }

    #[instrument(skip(self, kit), fields(kit_id = kit.id, barcode = %kit.barcode))]
    async fn reconcile_kit(&self, kit: &Kit) -> ReconciliationResult {
        let mut result = ReconciliationResult::for_kit(kit);

        match self.try_reconcile(kit, &mut result).await {
            Ok(()) => {
                result.success = true;
                info!(
                    old_breakdown_count = result.old_breakdown_count,
                    new_breakdown_count = result.new_breakdown_count,
                    matched_master_markers = result.matched_master_markers,
                    "Kit reconciled"
                );
            }
            Err(err) => {
                error!(error = %err, "Kit reconciliation failed");
                result.error = Some(err.to_string());
            }
        }

        result
    }

    async fn try_reconcile(&self, kit: &Kit, result: &mut ReconciliationResult) -> Result<()> {
        let repository = self.ingestion.repository();

        result.old_breakdown_count = repository.breakdown_counts(kit.id).await?.total;

        let metadata = kit.metadata();
        let Some((bucket, key)) = metadata.file_location() else {
            warn!(file_metadata = %kit.file_metadata, "Kit metadata missing bucket or key");
            return Err(IngestError::MissingFileLocation);
        };

        let key = self.resolve_key(bucket, key).await?;

        self.ingestion.process(bucket, &key, ProcessMode::Force).await?;

        let counts = repository.breakdown_counts(kit.id).await?;
        result.new_breakdown_count = counts.total;
        result.matched_master_markers = counts.matched;

        Ok(())
    }

    /// Files move from `pending/` to `completed/` after first processing
    async fn resolve_key(&self, bucket: &str, key: &str) -> Result<String> {
        let storage = self.ingestion.storage();

        if storage.exists(bucket, key).await? {
            return Ok(key.to_string());
        }

        let Some(completed) = completed_key(key) else {
            return Ok(key.to_string());
        };

        if storage.exists(bucket, &completed).await? {
            info!(original = %key, resolved = %completed, "Using completed key for pending file");
            Ok(completed)
        } else {
            warn!(pending = %key, completed = %completed, "File not found under pending or completed");
            Ok(key.to_string())
        }
    }
}
