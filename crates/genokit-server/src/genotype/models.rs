//! Parsed genotype file structures

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header keys the pipeline copies into kit metadata
pub const PROCESSING_DATE_KEY: &str = "processingDate";
pub const FORMAT_VERSION_KEYS: [&str; 2] = ["GSGT Version", "gsgtVersion"];
pub const NUM_SNPS_KEYS: [&str; 2] = ["Num SNPs", "numSNPs"];
pub const TOTAL_SNPS_KEYS: [&str; 2] = ["Total SNPs", "totalSNPs"];

/// `[Header]` section as an ordered-insensitive key/value map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    entries: HashMap<String, String>,
}

impl FileHeader {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn processing_date(&self) -> Option<&str> {
        self.get(PROCESSING_DATE_KEY)
    }

    /// Version of the exporting software (source-format version)
    pub fn format_version(&self) -> Option<&str> {
        self.first_of(&FORMAT_VERSION_KEYS)
    }

    pub fn num_snps(&self) -> Option<&str> {
        self.first_of(&NUM_SNPS_KEYS)
    }

    pub fn total_snps(&self) -> Option<&str> {
        self.first_of(&TOTAL_SNPS_KEYS)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One kept `[Data]` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenotypeRow {
    pub sample_id: String,
    pub marker_id: String,
    pub chromosome: String,
    pub position: String,
    pub allele1: String,
    pub allele2: String,
}

/// Parser output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedGenotypeFile {
    pub header: FileHeader,
    /// First non-empty sample id in the data section; empty means nothing to do
    pub sample_id: String,
    pub rows: Vec<GenotypeRow>,
    /// Data rows with enough columns, kept or not
    pub data_rows_seen: usize,
}

impl ParsedGenotypeFile {
    pub fn has_sample_id(&self) -> bool {
        !self.sample_id.trim().is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }
}
