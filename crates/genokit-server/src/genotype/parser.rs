//! Line-oriented parser for the partner's genotype export

use super::models::{FileHeader, GenotypeRow, ParsedGenotypeFile};
use crate::catalog::MarkerCatalog;

/// Sample id, marker id, chromosome, position, allele 1, allele 2
pub const MIN_DATA_COLUMNS: usize = 6;

const HEADER_MARKER: &str = "[Header]";
const DATA_MARKER: &str = "[Data]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Header,
    DataColumns,
    Data,
}

/// Stateful parser bound to one catalog snapshot
pub struct GenotypeFileParser<'a> {
    catalog: &'a dyn MarkerCatalog,
}

impl<'a> GenotypeFileParser<'a> {
    pub fn new(catalog: &'a dyn MarkerCatalog) -> Self {
        Self { catalog }
    }

    /// Parse file text. Never fails; unreadable lines are dropped.
    pub fn parse(&self, content: &str) -> ParsedGenotypeFile {
        let mut parsed = ParsedGenotypeFile::default();
        let mut section = Section::None;

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line {
                HEADER_MARKER => {
                    section = Section::Header;
                    continue;
                }
                DATA_MARKER => {
                    section = Section::DataColumns;
                    continue;
                }
                _ => {}
            }

            match section {
                Section::None => {}
                Section::Header => parse_header_line(line, &mut parsed.header),
                Section::DataColumns => section = Section::Data,
                Section::Data => self.parse_data_line(line, &mut parsed),
            }
        }

        parsed
    }

    fn parse_data_line(&self, line: &str, parsed: &mut ParsedGenotypeFile) {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < MIN_DATA_COLUMNS {
            return;
        }
        parsed.data_rows_seen += 1;

        let (sample_id, marker_id, chromosome, position, allele1, allele2) =
            (fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]);

        if parsed.sample_id.is_empty() && !sample_id.is_empty() {
            parsed.sample_id = sample_id.to_string();
        }

        if !self.catalog.is_allowed(marker_id)
            || position.is_empty()
            || allele1.is_empty()
            || allele2.is_empty()
        {
            return;
        }

        parsed.rows.push(GenotypeRow {
            sample_id: sample_id.to_string(),
            marker_id: marker_id.to_string(),
            chromosome: chromosome.to_string(),
            position: position.to_string(),
            allele1: allele1.to_string(),
            allele2: allele2.to_string(),
        });
    }
}

fn parse_header_line(line: &str, header: &mut FileHeader) {
    if let Some((key, value)) = line.split_once('\t') {
        header.insert(key.trim(), value.trim());
    }
}

/// Convenience wrapper around [`GenotypeFileParser`]
pub fn parse_genotype_file(content: &str, catalog: &dyn MarkerCatalog) -> ParsedGenotypeFile {
    GenotypeFileParser::new(catalog).parse(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReferenceCatalog;

    const SAMPLE: &str = "[Header]\n\
        GSGT Version\t2.0.4\n\
        processingDate\t2024-01-01\n\
        [Data]\n\
        Sample ID\tSNP Name\tChr\tPosition\tAllele1 - Plus\tAllele2 - Plus\n\
        S1\trs123\t1\t1000\tA\tG\n\
        S1\trs999\t2\t2000\tC\tC\n";

    fn catalog() -> ReferenceCatalog {
        ReferenceCatalog::allowing(["rs123", "rs456"])
    }

    #[test]
    fn test_parse_keeps_allowed_markers_only() {
        let parsed = parse_genotype_file(SAMPLE, &catalog());

        assert_eq!(parsed.sample_id, "S1");
        assert_eq!(parsed.header.format_version(), Some("2.0.4"));
        assert_eq!(parsed.header.processing_date(), Some("2024-01-01"));
        assert_eq!(parsed.data_rows_seen, 2);
        assert_eq!(parsed.rows.len(), 1);

        let row = &parsed.rows[0];
        assert_eq!(row.marker_id, "rs123");
        assert_eq!(row.chromosome, "1");
        assert_eq!(row.position, "1000");
        assert_eq!((row.allele1.as_str(), row.allele2.as_str()), ("A", "G"));
    }

    #[test]
    fn test_column_header_row_is_skipped() {
        // A column row that happens to name an allowed marker must not be kept
        let content = "[Data]\nS1\trs123\t1\t1000\tA\tG\nS1\trs456\t1\t2000\tT\tT\n";
        let parsed = parse_genotype_file(content, &catalog());

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].marker_id, "rs456");
    }

    #[test]
    fn test_blank_lines_and_whitespace_are_ignored() {
        let content = "\n  [Header]  \n\nGSGT Version\t2.0.4\n\n [Data]\ncols\n\n  S1\trs123\t1\t1000\tA\tG  \n";
        let parsed = parse_genotype_file(content, &catalog());

        assert_eq!(parsed.header.format_version(), Some("2.0.4"));
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].allele2, "G");
    }

    #[test]
    fn test_short_rows_are_dropped() {
        let content = "[Data]\ncols\nS1\trs123\t1\t1000\tA\n";
        let parsed = parse_genotype_file(content, &catalog());

        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.data_rows_seen, 0);
        assert!(!parsed.has_sample_id());
    }

    #[test]
    fn test_rows_with_missing_calls_are_dropped() {
        let content = "[Data]\ncols\nS1\trs123\t1\t\tA\tG\nS1\trs456\t1\t5\t\tG\n";
        let parsed = parse_genotype_file(content, &catalog());

        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.data_rows_seen, 2);
        assert_eq!(parsed.sample_id, "S1");
    }

    #[test]
    fn test_sample_id_taken_from_dropped_row() {
        let content = "[Data]\ncols\nS9\trs000\t1\t1\tA\tA\nS10\trs123\t1\t1000\tA\tG\n";
        let parsed = parse_genotype_file(content, &catalog());

        assert_eq!(parsed.sample_id, "S9");
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].sample_id, "S10");
    }

    #[test]
    fn test_header_value_keeps_remaining_fields() {
        let content = "[Header]\nContent\tGSA\tv3\nnotab\n";
        let parsed = parse_genotype_file(content, &catalog());

        assert_eq!(parsed.header.get("Content"), Some("GSA\tv3"));
        assert_eq!(parsed.header.len(), 1);
    }

    #[test]
    fn test_missing_sections_yield_empty_result() {
        let parsed = parse_genotype_file("S1\trs123\t1\t1000\tA\tG\n", &catalog());
        assert_eq!(parsed, ParsedGenotypeFile::default());

        let parsed = parse_genotype_file("", &catalog());
        assert!(parsed.header.is_empty());
        assert!(!parsed.has_sample_id());
    }

    #[test]
    fn test_header_aliases() {
        let content = "[Header]\ngsgtVersion\t1.9\nNum SNPs\t654027\nTotal SNPs\t654027\n";
        let parsed = parse_genotype_file(content, &catalog());

        assert_eq!(parsed.header.format_version(), Some("1.9"));
        assert_eq!(parsed.header.num_snps(), Some("654027"));
        assert_eq!(parsed.header.total_snps(), Some("654027"));
    }
}
