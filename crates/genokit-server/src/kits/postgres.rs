//! Postgres-backed kit repository

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

use super::models::{
    BreakdownCounts, BreakdownRow, Kit, NewActivity, NewKit, NewPatientActivity,
    ProcessedUpdate, StatusChange,
};
use super::repository::{KitRepository, RepositoryError, Result};
use super::status::KitStatus;
use super::DEFAULT_BREAKDOWN_BATCH_SIZE;

#[derive(Clone)]
pub struct PgKitRepository {
    db: PgPool,
    batch_size: usize,
}

impl PgKitRepository {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            batch_size: DEFAULT_BREAKDOWN_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    async fn batch_insert_breakdown(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kit_id: i64,
        rows: &[&BreakdownRow],
    ) -> Result<u64> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO kit_breakdowns (
                kit_id,
                marker_id,
                chromosome,
                position,
                reference_allele,
                alternate_allele,
                genotype,
                master_marker_id
            )
            "#,
        );

        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(kit_id)
                .push_bind(&row.marker_id)
                .push_bind(&row.chromosome)
                .push_bind(row.position)
                .push_bind(&row.reference_allele)
                .push_bind(&row.alternate_allele)
                .push_bind(&row.genotype)
                .push_bind(row.master_marker_id);
        });

        query_builder.push(" ON CONFLICT (kit_id, marker_id) DO NOTHING");

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KitRepository for PgKitRepository {
    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Kit>> {
        let kit = sqlx::query_as::<_, Kit>(
            "SELECT * FROM kits WHERE barcode = $1 AND deleted_at IS NULL",
        )
        .bind(barcode)
        .fetch_optional(&self.db)
        .await?;

        Ok(kit)
    }

    #[instrument(skip(self, kit), fields(barcode = %kit.barcode))]
    async fn create_kit(&self, kit: NewKit) -> Result<(Kit, bool)> {
        let inserted = sqlx::query_as::<_, Kit>(
            r#"
            INSERT INTO kits (
                barcode,
                status,
                is_failed_processing,
                failed_processing_reason,
                file_metadata
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (barcode) WHERE deleted_at IS NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&kit.barcode)
        .bind(kit.status.as_str())
        .bind(kit.is_failed_processing)
        .bind(&kit.failed_processing_reason)
        .bind(&kit.file_metadata)
        .fetch_optional(&self.db)
        .await?;

        if let Some(created) = inserted {
            info!(kit_id = created.id, status = %created.status, "Kit created");
            return Ok((created, true));
        }

        debug!("Kit already exists, using the existing row");
        self.find_by_barcode(&kit.barcode)
            .await?
            .map(|existing| (existing, false))
            .ok_or(RepositoryError::CreateConflict(kit.barcode))
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn replace_breakdown(&self, kit_id: i64, rows: &[BreakdownRow]) -> Result<u64> {
        let mut seen = HashSet::with_capacity(rows.len());
        let unique: Vec<&BreakdownRow> =
            rows.iter().filter(|row| seen.insert(row.marker_id.as_str())).collect();

        let mut tx = self.db.begin().await?;

        let deleted = sqlx::query("DELETE FROM kit_breakdowns WHERE kit_id = $1")
            .bind(kit_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        debug!(deleted, "Deleted existing breakdown rows");

        let total_chunks = unique.len().div_ceil(self.batch_size);
        let mut inserted = 0;

        for (chunk_idx, chunk) in unique.chunks(self.batch_size).enumerate() {
            let count = self.batch_insert_breakdown(&mut tx, kit_id, chunk).await?;
            inserted += count;
            debug!(
                chunk = chunk_idx + 1,
                total_chunks,
                inserted = count,
                "Inserted breakdown chunk"
            );
        }

        tx.commit().await?;

        info!(deleted, inserted, "Breakdown replaced");

        Ok(inserted)
    }

    async fn mark_processed(&self, kit_id: i64, update: ProcessedUpdate) -> Result<Kit> {
        sqlx::query_as::<_, Kit>(
            r#"
            UPDATE kits
            SET is_processed = TRUE,
                is_failed_processing = FALSE,
                failed_processing_reason = NULL,
                status = $2,
                file_metadata = COALESCE(file_metadata, '{}'::jsonb) || $3,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(kit_id)
        .bind(update.status.as_str())
        .bind(&update.metadata_patch)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RepositoryError::KitNotFound(kit_id))
    }

    async fn mark_failed(&self, kit_id: i64, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE kits
            SET is_failed_processing = TRUE,
                failed_processing_reason = $2,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(kit_id)
        .bind(reason)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::KitNotFound(kit_id));
        }
        Ok(())
    }

    async fn apply_status(&self, kit_id: i64, change: StatusChange) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE kits
            SET status = $2,
                is_failed_processing = $3,
                failed_processing_reason = $4,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND status <> $5
            "#,
        )
        .bind(kit_id)
        .bind(change.status.as_str())
        .bind(change.is_failed_processing)
        .bind(&change.failed_processing_reason)
        .bind(KitStatus::GenotypingAccepted.as_str())
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let live: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM kits WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(kit_id)
        .fetch_one(&self.db)
        .await?;

        if !live {
            return Err(RepositoryError::KitNotFound(kit_id));
        }
        debug!("Kit already genotyped, status left unchanged");
        Ok(false)
    }

    async fn append_activity(&self, activity: NewActivity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kit_activities (kit_id, activity, status, metadata)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(activity.kit_id)
        .bind(&activity.activity)
        .bind(activity.status.as_str())
        .bind(&activity.metadata)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn append_patient_activity(&self, activity: NewPatientActivity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO patient_activities (patient_id, organization_id, kit_id, activity, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(activity.patient_id)
        .bind(activity.organization_id)
        .bind(activity.kit_id)
        .bind(&activity.activity)
        .bind(&activity.metadata)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn breakdown_counts(&self, kit_id: i64) -> Result<BreakdownCounts> {
        let (total, matched): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(master_marker_id)
            FROM kit_breakdowns
            WHERE kit_id = $1
            "#,
        )
        .bind(kit_id)
        .fetch_one(&self.db)
        .await?;

        Ok(BreakdownCounts {
            total: total.max(0) as u64,
            matched: matched.max(0) as u64,
        })
    }

    async fn list_processed_kits(&self) -> Result<Vec<Kit>> {
        let kits = sqlx::query_as::<_, Kit>(
            r#"
            SELECT * FROM kits
            WHERE is_processed AND deleted_at IS NULL
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(kits)
    }
}
