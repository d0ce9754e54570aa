//! Catch-up pass over files still sitting under `pending/`
//!
//! Covers notifications that were lost or expired. Files are processed one
//! at a time with a pause in between; already-processed kits short-circuit
//! in the ingestion service.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use super::service::{IngestOutcome, IngestionService};
use super::Result;
use crate::storage::PENDING_PREFIX;

pub const DEFAULT_SWEEP_PAUSE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepResult {
    pub key: String,
    pub success: bool,
    pub outcome: Option<IngestOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<SweepResult>,
}

pub struct PendingFileSweep {
    ingestion: Arc<IngestionService>,
    pause: Duration,
}

impl PendingFileSweep {
    pub fn new(ingestion: Arc<IngestionService>, pause: Duration) -> Self {
        Self { ingestion, pause }
    }

    pub async fn pending_keys(&self, bucket: &str) -> Result<Vec<String>> {
        Ok(self.ingestion.storage().list(bucket, PENDING_PREFIX).await?)
    }

    #[instrument(skip(self), fields(trace_id = %uuid::Uuid::new_v4()))]
    pub async fn run(&self, bucket: &str) -> Result<SweepReport> {
        let keys = self.pending_keys(bucket).await?;
        if keys.is_empty() {
            info!("No pending genotype files found");
            return Ok(SweepReport::default());
        }

        info!(files = keys.len(), "Found pending genotype files to process");

        let mut results = Vec::with_capacity(keys.len());
        for (idx, key) in keys.iter().enumerate() {
            let result = match self.ingestion.process_file(bucket, key).await {
                Ok(outcome) => SweepResult {
                    key: key.clone(),
                    success: true,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(err) => {
                    error!(key = %key, error = %err, "Error processing pending genotype file");
                    SweepResult {
                        key: key.clone(),
                        success: false,
                        outcome: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            results.push(result);

            if idx + 1 < keys.len() && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        let report = SweepReport {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        };

        info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "Pending genotype files processing completed"
        );

        Ok(report)
    }
}
