//! Genotype file ingestion
//!
//! Turns one file in object storage into the breakdown rows of one kit:
//! download, parse, match against the catalog, replace the kit's rows,
//! advance the kit to `GENOTYPING_ACCEPTED`, record activity, and move the
//! source file from `pending/` to `completed/`.
//!
//! The kit's `is_processed` flag is the idempotency key. A redelivered
//! notification for a processed kit is a no-op unless the caller forces a
//! redo (reconciliation). Redeliveries that arrive after the file was moved
//! read it from `completed/`.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{IngestError, Result};
use crate::catalog::MarkerCatalog;
use crate::genotype::{parse_genotype_file, GenotypeRow, ParsedGenotypeFile};
use crate::kits::{
    BreakdownRow, Kit, KitRepository, KitStatus, NewActivity, NewKit, NewPatientActivity,
    ProcessedUpdate,
};
use crate::storage::{completed_key, ObjectStore, StorageError};

pub const PROCESSED_ACTIVITY: &str = "DNA file processed successfully";
pub const PATIENT_RESULT_ACTIVITY: &str = "Lab result completed";

/// Whether the already-processed guard applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessMode {
    #[default]
    Normal,
    /// Reprocess even if the kit is already processed
    Force,
}

/// Successful ingestion of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedFile {
    pub kit_id: i64,
    pub sample_id: String,
    /// Rows kept by the parser
    pub total_rows: usize,
    /// Rows written to the breakdown
    pub records_created: u64,
    pub reprocessed: bool,
    /// Key the source file was moved to, if it was moved
    pub relocated_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The file had no sample id; nothing was written
    NoSampleId,
    /// The kit was processed before; nothing was written
    AlreadyProcessed { kit_id: i64, sample_id: String },
    Processed(ProcessedFile),
}

pub struct IngestionService {
    repository: Arc<dyn KitRepository>,
    storage: Arc<dyn ObjectStore>,
    catalog: Arc<dyn MarkerCatalog>,
}

impl IngestionService {
    pub fn new(
        repository: Arc<dyn KitRepository>,
        storage: Arc<dyn ObjectStore>,
        catalog: Arc<dyn MarkerCatalog>,
    ) -> Self {
        Self {
            repository,
            storage,
            catalog,
        }
    }

    pub fn repository(&self) -> &Arc<dyn KitRepository> {
        &self.repository
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        &self.storage
    }

    /// Process a newly delivered file
    pub async fn process_file(&self, bucket: &str, key: &str) -> Result<IngestOutcome> {
        self.process(bucket, key, ProcessMode::Normal).await
    }

    /// Errors are returned after the kit (if one could be identified) is
    /// marked as failed, so the caller can leave the message for redelivery.
    #[instrument(skip(self), fields(sample_id))]
    pub async fn process(&self, bucket: &str, key: &str, mode: ProcessMode) -> Result<IngestOutcome> {
        info!("Processing genotype file");

        let (bytes, source_key) = self.download(bucket, key).await.inspect_err(|err| {
            error!(error = %err, "Error downloading genotype file");
        })?;
        let content = String::from_utf8_lossy(&bytes);

        let mut sample_id = None;
        let outcome = match self.ingest(bucket, key, &content, mode, &mut sample_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "Error processing genotype file");
                if let Some(sample_id) = sample_id {
                    self.record_failure(&sample_id, &err).await;
                }
                return Err(err);
            }
        };

        match outcome {
            IngestOutcome::Processed(mut processed) => {
                if source_key == key {
                    processed.relocated_to = self.relocate(bucket, key).await;
                }
                info!(
                    kit_id = processed.kit_id,
                    records_created = processed.records_created,
                    total_rows = processed.total_rows,
                    reprocessed = processed.reprocessed,
                    "Genotype file processed"
                );
                Ok(IngestOutcome::Processed(processed))
            }
            other => Ok(other),
        }
    }

    /// Fetch the file; a `pending/` key that is gone is looked up under
    /// `completed/`, where an earlier delivery moved it. Returns the key read.
    async fn download(&self, bucket: &str, key: &str) -> Result<(Vec<u8>, String)> {
        match self.storage.download(bucket, key).await {
            Ok(bytes) => Ok((bytes, key.to_string())),
            Err(err @ StorageError::NotFound { .. }) => {
                let Some(completed) = completed_key(key) else {
                    return Err(err.into());
                };
                debug!(completed = %completed, "Pending file not found, trying completed key");
                let bytes = self.storage.download(bucket, &completed).await?;
                Ok((bytes, completed))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn ingest(
        &self,
        bucket: &str,
        key: &str,
        content: &str,
        mode: ProcessMode,
        sample_id_out: &mut Option<String>,
    ) -> Result<IngestOutcome> {
        let parsed = parse_genotype_file(content, self.catalog.as_ref());

        if !parsed.has_sample_id() {
            warn!(
                data_rows = parsed.data_rows_seen,
                "No sample id found in genotype file, nothing to process"
            );
            return Ok(IngestOutcome::NoSampleId);
        }

        let sample_id = parsed.sample_id.clone();
        tracing::Span::current().record("sample_id", sample_id.as_str());
        *sample_id_out = Some(sample_id.clone());

        info!(
            total_rows = parsed.total_rows(),
            data_rows = parsed.data_rows_seen,
            num_snps = ?parsed.header.num_snps(),
            total_snps = ?parsed.header.total_snps(),
            "Genotype file parsed"
        );

        let (kit, created) = self
            .repository
            .find_or_create(NewKit::received(&sample_id))
            .await?;

        if created {
            info!(kit_id = kit.id, "No kit registered for sample id, created one");
        }

        if kit.is_processed && mode == ProcessMode::Normal {
            info!(kit_id = kit.id, "Kit already processed, skipping");
            return Ok(IngestOutcome::AlreadyProcessed {
                kit_id: kit.id,
                sample_id,
            });
        }

        let rows = self.breakdown_rows(&parsed.rows);
        let records_created = self.repository.replace_breakdown(kit.id, &rows).await?;

        let total_rows = parsed.total_rows();
        let reprocessed = kit.is_processed;
        let header = &parsed.header;

        let kit = self
            .repository
            .mark_processed(
                kit.id,
                ProcessedUpdate {
                    status: KitStatus::GenotypingAccepted,
                    metadata_patch: json!({
                        "bucket": bucket,
                        "key": key,
                        "totalSNPs": total_rows,
                        "processingDate": header.processing_date(),
                        "gsgtVersion": header.format_version(),
                    }),
                },
            )
            .await?;

        self.repository
            .append_activity(NewActivity {
                kit_id: kit.id,
                activity: PROCESSED_ACTIVITY.to_string(),
                status: KitStatus::GenotypingAccepted,
                metadata: json!({
                    "recordsCreated": records_created,
                    "totalSNPs": total_rows,
                    "sampleId": sample_id,
                    "bucket": bucket,
                    "key": key,
                    "processingDate": header.processing_date(),
                    "gsgtVersion": header.format_version(),
                    "reprocessed": reprocessed,
                }),
            })
            .await?;

        // Patients hear about a result once; reconciliation reruns stay quiet
        if !reprocessed {
            self.notify_patient(&kit, &parsed).await?;
        }

        Ok(IngestOutcome::Processed(ProcessedFile {
            kit_id: kit.id,
            sample_id,
            total_rows,
            records_created,
            reprocessed,
            relocated_to: None,
        }))
    }

    /// Convert parsed rows, dropping those whose position is not an integer
    fn breakdown_rows(&self, rows: &[GenotypeRow]) -> Vec<BreakdownRow> {
        rows.iter()
            .filter_map(|row| {
                let Ok(position) = row.position.parse::<i64>() else {
                    warn!(
                        marker_id = %row.marker_id,
                        position = %row.position,
                        "Invalid position value, skipping row"
                    );
                    return None;
                };
                Some(BreakdownRow::new(
                    row.marker_id.as_str(),
                    row.chromosome.as_str(),
                    position,
                    &row.allele1,
                    &row.allele2,
                    self.catalog.master_marker_id(&row.marker_id),
                ))
            })
            .collect()
    }

    async fn notify_patient(&self, kit: &Kit, parsed: &ParsedGenotypeFile) -> Result<()> {
        let (Some(organization_id), Some(patient_id)) = (kit.organization_id, kit.patient_id) else {
            debug!(kit_id = kit.id, "Kit not linked to a patient, no patient activity");
            return Ok(());
        };

        self.repository
            .append_patient_activity(NewPatientActivity {
                patient_id,
                organization_id,
                kit_id: kit.id,
                activity: PATIENT_RESULT_ACTIVITY.to_string(),
                metadata: json!({
                    "barcode": kit.barcode,
                    "status": KitStatus::GenotypingAccepted,
                    "totalSNPs": parsed.total_rows(),
                }),
            })
            .await?;

        Ok(())
    }

    async fn record_failure(&self, sample_id: &str, err: &IngestError) {
        let reason = err.to_string();
        let result = async {
            if let Some(kit) = self.repository.find_by_barcode(sample_id).await? {
                self.repository.mark_failed(kit.id, &reason).await?;
                info!(kit_id = kit.id, reason = %reason, "Kit marked as failed");
            }
            Ok::<_, IngestError>(())
        }
        .await;

        if let Err(update_err) = result {
            error!(error = %update_err, "Error recording kit failure");
        }
    }

    /// Move `pending/<name>` to `completed/<name>`; failures are logged only
    async fn relocate(&self, bucket: &str, key: &str) -> Option<String> {
        let destination = completed_key(key)?;

        match self.storage.copy_then_delete(bucket, key, &destination).await {
            Ok(()) => {
                info!(from = %key, to = %destination, "Moved genotype file to completed");
                Some(destination)
            }
            Err(err) => {
                warn!(error = %err, from = %key, to = %destination, "Failed to move genotype file");
                None
            }
        }
    }
}

