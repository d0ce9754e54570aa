//! Kit, breakdown and activity records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::FromRow;

use super::status::{KitStatus, UnknownKitStatus};

impl TryFrom<String> for KitStatus {
    type Error = UnknownKitStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One physical test kit, identified by the barcode printed on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Kit {
    pub id: i64,
    pub barcode: String,
    pub organization_id: Option<i64>,
    pub patient_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub status: KitStatus,
    pub is_processed: bool,
    pub is_failed_processing: bool,
    pub failed_processing_reason: Option<String>,
    pub file_metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Kit {
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata::from_value(&self.file_metadata)
    }
}

/// Typed view over `kits.file_metadata`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, rename = "totalSNPs", skip_serializing_if = "Option::is_none")]
    pub total_snps: Option<u64>,
    #[serde(default, rename = "processingDate", skip_serializing_if = "Option::is_none")]
    pub processing_date: Option<String>,
    #[serde(default, rename = "gsgtVersion", skip_serializing_if = "Option::is_none")]
    pub gsgt_version: Option<String>,
}

impl FileMetadata {
    /// Lenient read: unknown keys are ignored, mistyped ones read as absent
    pub fn from_value(value: &Value) -> Self {
        let text = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            bucket: text("bucket"),
            key: text("key"),
            total_snps: value.get("totalSNPs").and_then(Value::as_u64),
            processing_date: text("processingDate"),
            gsgt_version: text("gsgtVersion"),
        }
    }

    /// Source object of the last processed file
    pub fn file_location(&self) -> Option<(&str, &str)> {
        match (self.bucket.as_deref(), self.key.as_deref()) {
            (Some(bucket), Some(key)) => Some((bucket, key)),
            _ => None,
        }
    }
}

/// Shallow merge of `patch` into `base`; non-object bases are replaced
pub fn merge_metadata(base: &Value, patch: &Value) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(patch) = patch {
        for (k, v) in patch {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}

/// Kit to insert when a sample arrives before registration
#[derive(Debug, Clone, PartialEq)]
pub struct NewKit {
    pub barcode: String,
    pub status: KitStatus,
    pub is_failed_processing: bool,
    pub failed_processing_reason: Option<String>,
    pub file_metadata: Value,
}

impl NewKit {
    pub fn received(barcode: impl Into<String>) -> Self {
        Self {
            barcode: barcode.into(),
            status: KitStatus::KitReceived,
            is_failed_processing: false,
            failed_processing_reason: None,
            file_metadata: json!({}),
        }
    }

    pub fn with_status(mut self, status: KitStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_failure(mut self, reason: Option<String>) -> Self {
        self.is_failed_processing = reason.is_some();
        self.failed_processing_reason = reason;
        self
    }
}

/// One genotype call matched against the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BreakdownRow {
    pub marker_id: String,
    pub chromosome: String,
    pub position: i64,
    pub reference_allele: String,
    pub alternate_allele: String,
    pub genotype: String,
    pub master_marker_id: Option<i64>,
}

impl BreakdownRow {
    pub fn new(
        marker_id: impl Into<String>,
        chromosome: impl Into<String>,
        position: i64,
        allele1: &str,
        allele2: &str,
        master_marker_id: Option<i64>,
    ) -> Self {
        let (reference_allele, alternate_allele) = (allele1.trim(), allele2.trim());
        Self {
            marker_id: marker_id.into(),
            chromosome: chromosome.into(),
            position,
            genotype: format!("{reference_allele}{alternate_allele}"),
            reference_allele: reference_allele.to_string(),
            alternate_allele: alternate_allele.to_string(),
            master_marker_id,
        }
    }
}

/// Breakdown row counts for a kit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownCounts {
    pub total: u64,
    /// Rows linked to a master-marker record
    pub matched: u64,
}

/// Fields written when a file is processed successfully
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedUpdate {
    pub status: KitStatus,
    pub metadata_patch: Value,
}

/// Status-feed mutation of an existing kit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: KitStatus,
    pub is_failed_processing: bool,
    pub failed_processing_reason: Option<String>,
}

/// Append-only audit entry on a kit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub kit_id: i64,
    pub activity: String,
    pub status: KitStatus,
    pub metadata: Value,
}

/// Stored activity entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: i64,
    pub kit_id: i64,
    pub activity: String,
    #[sqlx(try_from = "String")]
    pub status: KitStatus,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn is_skipped(&self) -> bool {
        self.metadata.get("skipped").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Patient-facing audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatientActivity {
    pub patient_id: i64,
    pub organization_id: i64,
    pub kit_id: i64,
    pub activity: String,
    pub metadata: Value,
}
