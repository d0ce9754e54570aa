//! In-memory kit repository for tests and dry runs

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use super::models::{
    merge_metadata, Activity, BreakdownCounts, BreakdownRow, Kit, NewActivity, NewKit,
    NewPatientActivity, ProcessedUpdate, StatusChange,
};
use super::repository::{KitRepository, RepositoryError, Result};

#[derive(Default)]
struct State {
    next_id: i64,
    kits: Vec<Kit>,
    breakdowns: HashMap<i64, Vec<BreakdownRow>>,
    activities: Vec<Activity>,
    patient_activities: Vec<NewPatientActivity>,
    fail_breakdown_writes: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_kit_mut(&mut self, kit_id: i64) -> Result<&mut Kit> {
        self.kits
            .iter_mut()
            .find(|k| k.id == kit_id && k.deleted_at.is_none())
            .ok_or(RepositoryError::KitNotFound(kit_id))
    }
}

/// Repository holding everything behind one async mutex
#[derive(Default)]
pub struct InMemoryKitRepository {
    state: Mutex<State>,
}

impl InMemoryKitRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a kit as-is, e.g. one already registered to a patient
    pub async fn insert_kit(&self, mut kit: Kit) -> Kit {
        let mut state = self.state.lock().await;
        kit.id = state.next_id();
        state.kits.push(kit.clone());
        kit
    }

    pub async fn kit(&self, kit_id: i64) -> Option<Kit> {
        self.state.lock().await.kits.iter().find(|k| k.id == kit_id).cloned()
    }

    pub async fn kits(&self) -> Vec<Kit> {
        self.state.lock().await.kits.clone()
    }

    pub async fn breakdown(&self, kit_id: i64) -> Vec<BreakdownRow> {
        self.state
            .lock()
            .await
            .breakdowns
            .get(&kit_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn activities(&self, kit_id: i64) -> Vec<Activity> {
        self.state
            .lock()
            .await
            .activities
            .iter()
            .filter(|a| a.kit_id == kit_id)
            .cloned()
            .collect()
    }

    pub async fn patient_activities(&self) -> Vec<NewPatientActivity> {
        self.state.lock().await.patient_activities.clone()
    }

    /// Make breakdown replacement fail, to exercise failure handling
    pub async fn fail_breakdown_writes(&self, fail: bool) {
        self.state.lock().await.fail_breakdown_writes = fail;
    }
}

/// A blank kit row for seeding the in-memory store
pub fn kit_fixture(barcode: &str) -> Kit {
    let now = Utc::now();
    Kit {
        id: 0,
        barcode: barcode.to_string(),
        organization_id: None,
        patient_id: None,
        status: super::KitStatus::KitReceived,
        is_processed: false,
        is_failed_processing: false,
        failed_processing_reason: None,
        file_metadata: Value::Object(Default::default()),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

#[async_trait]
impl KitRepository for InMemoryKitRepository {
    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Kit>> {
        let state = self.state.lock().await;
        Ok(state
            .kits
            .iter()
            .find(|k| k.barcode == barcode && k.deleted_at.is_none())
            .cloned())
    }

    async fn create_kit(&self, kit: NewKit) -> Result<(Kit, bool)> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .kits
            .iter()
            .find(|k| k.barcode == kit.barcode && k.deleted_at.is_none())
        {
            return Ok((existing.clone(), false));
        }

        let mut created = kit_fixture(&kit.barcode);
        created.id = state.next_id();
        created.status = kit.status;
        created.is_failed_processing = kit.is_failed_processing;
        created.failed_processing_reason = kit.failed_processing_reason;
        created.file_metadata = kit.file_metadata;
        state.kits.push(created.clone());
        Ok((created, true))
    }

    async fn replace_breakdown(&self, kit_id: i64, rows: &[BreakdownRow]) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.live_kit_mut(kit_id)?;
        if state.fail_breakdown_writes {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut seen = HashSet::new();
        let unique: Vec<BreakdownRow> = rows
            .iter()
            .filter(|row| seen.insert(row.marker_id.clone()))
            .cloned()
            .collect();
        let inserted = unique.len() as u64;
        state.breakdowns.insert(kit_id, unique);
        Ok(inserted)
    }

    async fn mark_processed(&self, kit_id: i64, update: ProcessedUpdate) -> Result<Kit> {
        let mut state = self.state.lock().await;
        let kit = state.live_kit_mut(kit_id)?;
        kit.is_processed = true;
        kit.is_failed_processing = false;
        kit.failed_processing_reason = None;
        kit.status = update.status;
        kit.file_metadata = merge_metadata(&kit.file_metadata, &update.metadata_patch);
        kit.updated_at = Utc::now();
        Ok(kit.clone())
    }

    async fn mark_failed(&self, kit_id: i64, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let kit = state.live_kit_mut(kit_id)?;
        kit.is_failed_processing = true;
        kit.failed_processing_reason = Some(reason.to_string());
        kit.updated_at = Utc::now();
        Ok(())
    }

    async fn apply_status(&self, kit_id: i64, change: StatusChange) -> Result<bool> {
        let mut state = self.state.lock().await;
        let kit = state.live_kit_mut(kit_id)?;
        if kit.status.is_terminal_for_feed() {
            return Ok(false);
        }
        kit.status = change.status;
        kit.is_failed_processing = change.is_failed_processing;
        kit.failed_processing_reason = change.failed_processing_reason;
        kit.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_activity(&self, activity: NewActivity) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.activities.push(Activity {
            id,
            kit_id: activity.kit_id,
            activity: activity.activity,
            status: activity.status,
            metadata: activity.metadata,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn append_patient_activity(&self, activity: NewPatientActivity) -> Result<()> {
        self.state.lock().await.patient_activities.push(activity);
        Ok(())
    }

    async fn breakdown_counts(&self, kit_id: i64) -> Result<BreakdownCounts> {
        let state = self.state.lock().await;
        let rows = state.breakdowns.get(&kit_id).map(Vec::as_slice).unwrap_or_default();
        Ok(BreakdownCounts {
            total: rows.len() as u64,
            matched: rows.iter().filter(|r| r.master_marker_id.is_some()).count() as u64,
        })
    }

    async fn list_processed_kits(&self) -> Result<Vec<Kit>> {
        let state = self.state.lock().await;
        let mut kits: Vec<Kit> = state
            .kits
            .iter()
            .filter(|k| k.is_processed && k.deleted_at.is_none())
            .cloned()
            .collect();
        kits.sort_by_key(|k| (k.created_at, k.id));
        Ok(kits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kits::KitStatus;
    use serde_json::json;

    fn row(marker: &str, master: Option<i64>) -> BreakdownRow {
        BreakdownRow::new(marker, "1", 100, "A", "G", master)
    }

    #[tokio::test]
    async fn test_create_kit_is_idempotent_per_barcode() {
        let repo = InMemoryKitRepository::new();
        let (first, created) = repo.create_kit(NewKit::received("S1")).await.unwrap();
        assert!(created);
        let (second, created) = repo.create_kit(NewKit::received("S1")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(repo.kits().await.len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_kits_are_invisible() {
        let repo = InMemoryKitRepository::new();
        let mut kit = kit_fixture("S1");
        kit.deleted_at = Some(Utc::now());
        repo.insert_kit(kit).await;

        assert!(repo.find_by_barcode("S1").await.unwrap().is_none());
        let (live, created) = repo.find_or_create(NewKit::received("S1")).await.unwrap();
        assert!(created);
        assert!(live.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_replace_breakdown_replaces_and_dedups() {
        let repo = InMemoryKitRepository::new();
        let (kit, _) = repo.create_kit(NewKit::received("S1")).await.unwrap();

        repo.replace_breakdown(kit.id, &[row("rs1", None), row("rs2", Some(1))])
            .await
            .unwrap();
        let inserted = repo
            .replace_breakdown(kit.id, &[row("rs3", Some(2)), row("rs3", None)])
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        let rows = repo.breakdown(kit.id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].master_marker_id, Some(2));
        assert_eq!(
            repo.breakdown_counts(kit.id).await.unwrap(),
            BreakdownCounts { total: 1, matched: 1 }
        );
    }

    #[tokio::test]
    async fn test_mark_processed_merges_metadata() {
        let repo = InMemoryKitRepository::new();
        let (kit, _) = repo
            .create_kit(NewKit {
                file_metadata: json!({"bucket": "b", "key": "k"}),
                ..NewKit::received("S1")
            })
            .await
            .unwrap();
        repo.mark_failed(kit.id, "boom").await.unwrap();

        let kit = repo
            .mark_processed(
                kit.id,
                ProcessedUpdate {
                    status: KitStatus::GenotypingAccepted,
                    metadata_patch: json!({"totalSNPs": 3}),
                },
            )
            .await
            .unwrap();

        assert!(kit.is_processed);
        assert!(!kit.is_failed_processing);
        assert_eq!(kit.failed_processing_reason, None);
        assert_eq!(kit.file_metadata, json!({"bucket": "b", "key": "k", "totalSNPs": 3}));
    }

    #[tokio::test]
    async fn test_apply_status_leaves_genotyped_kit_alone() {
        let repo = InMemoryKitRepository::new();
        let (kit, _) = repo.create_kit(NewKit::received("S1")).await.unwrap();
        let change = |status| StatusChange {
            status,
            is_failed_processing: true,
            failed_processing_reason: Some("late".to_string()),
        };

        assert!(repo.apply_status(kit.id, change(KitStatus::QcFailed)).await.unwrap());
        repo.mark_processed(
            kit.id,
            ProcessedUpdate {
                status: KitStatus::GenotypingAccepted,
                metadata_patch: json!({}),
            },
        )
        .await
        .unwrap();
        assert!(!repo.apply_status(kit.id, change(KitStatus::GenotypingFailed)).await.unwrap());

        let kit = repo.kit(kit.id).await.unwrap();
        assert_eq!(kit.status, KitStatus::GenotypingAccepted);
        assert!(!kit.is_failed_processing);
    }

    #[tokio::test]
    async fn test_unknown_kit_is_reported() {
        let repo = InMemoryKitRepository::new();
        let err = repo.mark_failed(42, "boom").await.unwrap_err();
        assert!(matches!(err, RepositoryError::KitNotFound(42)));
    }
}
