//! Genotype file parsing
//!
//! The sequencing partner delivers a tab-separated export with a `[Header]`
//! section of key/value pairs and a `[Data]` section of one call per marker:
//!
//! ```text
//! [Header]
//! GSGT Version	2.0.4
//! processingDate	2024-01-01
//! [Data]
//! Sample ID	SNP Name	Chr	Position	Allele1 - Plus	Allele2 - Plus
//! S1	rs123	1	1000	A	G
//! ```
//!
//! The format is not validated upstream, so parsing never fails: anything it
//! cannot read is dropped and the caller decides what an empty result means.

pub mod models;
pub mod parser;

pub use models::{FileHeader, GenotypeRow, ParsedGenotypeFile};
pub use parser::{parse_genotype_file, GenotypeFileParser, MIN_DATA_COLUMNS};
