//! Lab-status feed updates
//!
//! The feed and the file notifications race for the same sample. Once the
//! file pipeline has accepted the genotype (`GENOTYPING_ACCEPTED`) the feed
//! can no longer change the kit; its updates are still logged as skipped
//! activity entries.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::Result;
use crate::kits::{
    describe_feed_status, is_failed_status, map_external_status, Kit, KitRepository, KitStatus,
    NewActivity, NewKit, StatusChange,
};

/// One validated feed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub sample_id: String,
    /// External status code as received
    pub status: String,
    /// RFC 3339
    pub timestamp: String,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusUpdateOutcome {
    /// No kit existed; one was created in this state
    Created { kit_id: i64, status: KitStatus },
    Applied { kit_id: i64, status: KitStatus },
    /// Kit is past the point the feed may change it
    Skipped { kit_id: i64 },
    /// Unknown status code for an existing kit
    Dropped,
}

pub struct StatusUpdateService {
    repository: Arc<dyn KitRepository>,
}

impl StatusUpdateService {
    pub fn new(repository: Arc<dyn KitRepository>) -> Self {
        Self { repository }
    }

    #[instrument(skip(self, update), fields(sample_id = %update.sample_id, status = %update.status))]
    pub async fn update_status(&self, update: &StatusUpdate) -> Result<StatusUpdateOutcome> {
        let mapped = map_external_status(&update.status);
        if mapped.is_none() {
            warn!("Unrecognized lab status code");
        }

        let kit = match self.repository.find_by_barcode(&update.sample_id).await? {
            Some(kit) => kit,
            None => {
                // The feed proves the sample arrived even if the code is unknown
                let status = mapped.unwrap_or(KitStatus::KitReceived);
                let new_kit = NewKit::received(&update.sample_id)
                    .with_status(status)
                    .with_failure(failure_reason(status, update));

                let (kit, created) = self.repository.create_kit(new_kit).await?;
                if created {
                    self.record(&kit, status, update, false).await?;
                    info!(kit_id = kit.id, status = %status, "Kit created from lab status");
                    return Ok(StatusUpdateOutcome::Created {
                        kit_id: kit.id,
                        status,
                    });
                }
                kit
            }
        };

        self.apply_to_existing(&kit, mapped, update).await
    }

    async fn apply_to_existing(
        &self,
        kit: &Kit,
        mapped: Option<KitStatus>,
        update: &StatusUpdate,
    ) -> Result<StatusUpdateOutcome> {
        let Some(status) = mapped else {
            warn!(kit_id = kit.id, "Dropping lab status update with unknown code");
            return Ok(StatusUpdateOutcome::Dropped);
        };

        if kit.status.is_terminal_for_feed() {
            return self.skip(kit, kit.status, update).await;
        }

        let reason = failure_reason(status, update);
        let applied = self
            .repository
            .apply_status(
                kit.id,
                StatusChange {
                    status,
                    is_failed_processing: reason.is_some(),
                    failed_processing_reason: reason,
                },
            )
            .await?;

        if !applied {
            // A file ingestion accepted the genotype after the kit was read
            let current = self
                .repository
                .find_by_barcode(&kit.barcode)
                .await?
                .map_or(KitStatus::GenotypingAccepted, |k| k.status);
            return self.skip(kit, current, update).await;
        }

        self.record(kit, status, update, false).await?;

        info!(kit_id = kit.id, from = %kit.status, to = %status, "Kit status updated");

        Ok(StatusUpdateOutcome::Applied {
            kit_id: kit.id,
            status,
        })
    }

    async fn skip(
        &self,
        kit: &Kit,
        current: KitStatus,
        update: &StatusUpdate,
    ) -> Result<StatusUpdateOutcome> {
        self.record(kit, current, update, true).await?;
        info!(
            kit_id = kit.id,
            current = %current,
            "Kit already genotyped, lab status recorded but not applied"
        );
        Ok(StatusUpdateOutcome::Skipped { kit_id: kit.id })
    }

    async fn record(
        &self,
        kit: &Kit,
        status: KitStatus,
        update: &StatusUpdate,
        skipped: bool,
    ) -> Result<()> {
        self.repository
            .append_activity(NewActivity {
                kit_id: kit.id,
                activity: describe_feed_status(&update.status),
                status,
                metadata: json!({
                    "sourceStatus": update.status,
                    "timestamp": update.timestamp,
                    "comment": update.comment,
                    "skipped": skipped,
                }),
            })
            .await?;
        Ok(())
    }
}

/// Reason stored on a failed kit: the lab's comment, else the status text
fn failure_reason(status: KitStatus, update: &StatusUpdate) -> Option<String> {
    if !is_failed_status(status) {
        return None;
    }
    let comment = update.comment.trim();
    Some(if comment.is_empty() {
        describe_feed_status(&update.status)
    } else {
        comment.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(status: &str, comment: &str) -> StatusUpdate {
        StatusUpdate {
            sample_id: "S1".to_string(),
            status: status.to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            comment: comment.to_string(),
        }
    }

    #[test]
    fn test_failure_reason_prefers_comment() {
        assert_eq!(
            failure_reason(KitStatus::QcFailed, &update("QC_FAILED", "low yield")),
            Some("low yield".to_string())
        );
        assert_eq!(
            failure_reason(KitStatus::QcFailed, &update("QC_FAILED", "  ")),
            Some("Sample failed quality control".to_string())
        );
        assert_eq!(failure_reason(KitStatus::QcPassed, &update("QC_PASSED", "ok")), None);
    }
}
