//! Reference catalog of clinically relevant markers
//!
//! The pipeline only reads the catalog. It answers two questions while a
//! genotype file is matched:
//!
//! - is this marker one we keep at all (`allowed_markers`)?
//! - which curated master record does it correspond to (`master_markers`)?
//!
//! The catalog is a snapshot. A worker loads it once at startup; the
//! reconciliation job loads a fresh one so breakdown rows can be rebuilt
//! after the seeding process changes either table.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Read-only marker lookup injected into the parser and the ingestion service
pub trait MarkerCatalog: Send + Sync {
    /// Membership test against the allowed-marker set
    fn is_allowed(&self, marker_id: &str) -> bool;

    /// Primary key of the master-marker record for this marker, if curated
    fn master_marker_id(&self, marker_id: &str) -> Option<i64>;

    /// Number of allowed markers, for logging
    fn allowed_count(&self) -> usize;
}

/// Curated description of one marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MasterMarker {
    pub id: i64,
    pub marker_id: String,
    pub gene_name: String,
    pub gene_summary: Option<String>,
    pub chromosome: String,
    pub position: i64,
    pub reference_allele: String,
    pub alternate_allele: String,
}

/// In-memory catalog snapshot
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    allowed: HashSet<String>,
    masters: HashMap<String, MasterMarker>,
}

impl ReferenceCatalog {
    pub fn new(
        allowed: impl IntoIterator<Item = impl Into<String>>,
        masters: impl IntoIterator<Item = MasterMarker>,
    ) -> Self {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            masters: masters
                .into_iter()
                .map(|m| (m.marker_id.clone(), m))
                .collect(),
        }
    }

    /// Catalog that allows the given markers and has no master records
    pub fn allowing(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(allowed, std::iter::empty())
    }

    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    /// Load both catalog tables
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let allowed: Vec<String> =
            sqlx::query_scalar("SELECT marker_id FROM allowed_markers")
                .fetch_all(pool)
                .await?;

        let masters: Vec<MasterMarker> = sqlx::query_as(
            r#"
            SELECT id, marker_id, gene_name, gene_summary, chromosome, position,
                   reference_allele, alternate_allele
            FROM master_markers
            "#,
        )
        .fetch_all(pool)
        .await?;

        let catalog = Self::new(allowed, masters);

        info!(
            allowed_markers = catalog.allowed.len(),
            master_markers = catalog.masters.len(),
            "Reference catalog loaded"
        );

        Ok(catalog)
    }
}

impl MarkerCatalog for ReferenceCatalog {
    fn is_allowed(&self, marker_id: &str) -> bool {
        self.allowed.contains(marker_id)
    }

    fn master_marker_id(&self, marker_id: &str) -> Option<i64> {
        self.masters.get(marker_id).map(|m| m.id)
    }

    fn allowed_count(&self) -> usize {
        self.allowed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master(id: i64, marker_id: &str) -> MasterMarker {
        MasterMarker {
            id,
            marker_id: marker_id.to_string(),
            gene_name: "ABCB1".to_string(),
            gene_summary: None,
            chromosome: "7".to_string(),
            position: 87509329,
            reference_allele: "A".to_string(),
            alternate_allele: "G".to_string(),
        }
    }

    #[test]
    fn test_membership_is_exact() {
        let catalog = ReferenceCatalog::allowing(["rs1045642", "rs1048943"]);
        assert!(catalog.is_allowed("rs1045642"));
        assert!(!catalog.is_allowed("RS1045642"));
        assert!(!catalog.is_allowed("rs104564"));
        assert_eq!(catalog.allowed_count(), 2);
    }

    #[test]
    fn test_master_lookup_independent_of_allowed_set() {
        let catalog = ReferenceCatalog::new(["rs1045642"], [master(7, "rs1045642"), master(8, "rs1")]);
        assert_eq!(catalog.master_marker_id("rs1045642"), Some(7));
        assert_eq!(catalog.master_marker_id("rs1"), Some(8));
        assert_eq!(catalog.master_marker_id("rs2"), None);
        assert_eq!(catalog.master_count(), 2);
    }
}
