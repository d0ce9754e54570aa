//! Kit lifecycle states and the lab-status feed vocabulary
//!
//! Expected forward order:
//!
//! ```text
//! KIT_RECEIVED -> QC_PASSED | QC_FAILED
//!              -> DNA_EXTRACTION_ACCEPTED | DNA_EXTRACTION_FAILED
//!              -> DNA_EXTRACTION_2ND_ACCEPTED | DNA_EXTRACTION_2ND_FAILED
//!              -> GENOTYPING_ACCEPTED | GENOTYPING_FAILED
//!              -> GENOTYPING_2ND_ACCEPTED | GENOTYPING_2ND_FAILED
//!              -> PROCESS | CANCEL
//! ```
//!
//! Every state is reachable directly from the feed; order is not enforced.
//! `PENDING` and `DISCARD` are administrative and never come from the feed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KitStatus {
    Pending,
    KitReceived,
    QcPassed,
    QcFailed,
    DnaExtractionAccepted,
    DnaExtractionFailed,
    #[serde(rename = "DNA_EXTRACTION_2ND_ACCEPTED")]
    DnaExtraction2ndAccepted,
    #[serde(rename = "DNA_EXTRACTION_2ND_FAILED")]
    DnaExtraction2ndFailed,
    GenotypingAccepted,
    GenotypingFailed,
    #[serde(rename = "GENOTYPING_2ND_ACCEPTED")]
    Genotyping2ndAccepted,
    #[serde(rename = "GENOTYPING_2ND_FAILED")]
    Genotyping2ndFailed,
    Hold,
    Process,
    Cancel,
    Discard,
}

impl KitStatus {
    pub const ALL: [KitStatus; 16] = [
        KitStatus::Pending,
        KitStatus::KitReceived,
        KitStatus::QcPassed,
        KitStatus::QcFailed,
        KitStatus::DnaExtractionAccepted,
        KitStatus::DnaExtractionFailed,
        KitStatus::DnaExtraction2ndAccepted,
        KitStatus::DnaExtraction2ndFailed,
        KitStatus::GenotypingAccepted,
        KitStatus::GenotypingFailed,
        KitStatus::Genotyping2ndAccepted,
        KitStatus::Genotyping2ndFailed,
        KitStatus::Hold,
        KitStatus::Process,
        KitStatus::Cancel,
        KitStatus::Discard,
    ];

    /// Stored and wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            KitStatus::Pending => "PENDING",
            KitStatus::KitReceived => "KIT_RECEIVED",
            KitStatus::QcPassed => "QC_PASSED",
            KitStatus::QcFailed => "QC_FAILED",
            KitStatus::DnaExtractionAccepted => "DNA_EXTRACTION_ACCEPTED",
            KitStatus::DnaExtractionFailed => "DNA_EXTRACTION_FAILED",
            KitStatus::DnaExtraction2ndAccepted => "DNA_EXTRACTION_2ND_ACCEPTED",
            KitStatus::DnaExtraction2ndFailed => "DNA_EXTRACTION_2ND_FAILED",
            KitStatus::GenotypingAccepted => "GENOTYPING_ACCEPTED",
            KitStatus::GenotypingFailed => "GENOTYPING_FAILED",
            KitStatus::Genotyping2ndAccepted => "GENOTYPING_2ND_ACCEPTED",
            KitStatus::Genotyping2ndFailed => "GENOTYPING_2ND_FAILED",
            KitStatus::Hold => "HOLD",
            KitStatus::Process => "PROCESS",
            KitStatus::Cancel => "CANCEL",
            KitStatus::Discard => "DISCARD",
        }
    }

    /// Kit has a processing failure recorded against it
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            KitStatus::QcFailed
                | KitStatus::DnaExtractionFailed
                | KitStatus::DnaExtraction2ndFailed
                | KitStatus::GenotypingFailed
                | KitStatus::Genotyping2ndFailed
                | KitStatus::Cancel
                | KitStatus::Discard
        )
    }

    /// Feed updates must not overwrite a kit in this state
    pub fn is_terminal_for_feed(self) -> bool {
        self == KitStatus::GenotypingAccepted
    }
}

impl fmt::Display for KitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a stored status string that is not a known state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown kit status: {0}")]
pub struct UnknownKitStatus(pub String);

impl FromStr for KitStatus {
    type Err = UnknownKitStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KitStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownKitStatus(s.to_string()))
    }
}

/// External lab-status codes accepted from the feed
pub const FEED_STATUS_TABLE: &[(&str, KitStatus)] = &[
    ("KIT_RECEIVED", KitStatus::KitReceived),
    ("QC_PASSED", KitStatus::QcPassed),
    ("QC_FAILED", KitStatus::QcFailed),
    ("DNA_EXTRACTION_ACCEPTED", KitStatus::DnaExtractionAccepted),
    ("DNA_EXTRACTION_FAILED", KitStatus::DnaExtractionFailed),
    ("DNA_EXTRACTION_2ND_ACCEPTED", KitStatus::DnaExtraction2ndAccepted),
    ("DNA_EXTRACTION_2ND_FAILED", KitStatus::DnaExtraction2ndFailed),
    ("GENOTYPING_ACCEPTED", KitStatus::GenotypingAccepted),
    ("GENOTYPING_FAILED", KitStatus::GenotypingFailed),
    ("GENOTYPING_2ND_ACCEPTED", KitStatus::Genotyping2ndAccepted),
    ("GENOTYPING_2ND_FAILED", KitStatus::Genotyping2ndFailed),
    ("HOLD", KitStatus::Hold),
    ("PROCESS", KitStatus::Process),
    ("DATA_DELIVERED", KitStatus::Process),
    ("CANCEL", KitStatus::Cancel),
];

/// Activity text recorded when a kit enters each state
pub const STATUS_MESSAGES: &[(KitStatus, &str)] = &[
    (KitStatus::Pending, "Kit registered and awaiting shipment to the lab"),
    (KitStatus::KitReceived, "Kit received by the lab"),
    (KitStatus::QcPassed, "Sample passed quality control"),
    (KitStatus::QcFailed, "Sample failed quality control"),
    (KitStatus::DnaExtractionAccepted, "DNA extraction completed"),
    (KitStatus::DnaExtractionFailed, "DNA extraction failed"),
    (KitStatus::DnaExtraction2ndAccepted, "Second DNA extraction completed"),
    (KitStatus::DnaExtraction2ndFailed, "Second DNA extraction failed"),
    (KitStatus::GenotypingAccepted, "Genotyping completed"),
    (KitStatus::GenotypingFailed, "Genotyping failed"),
    (KitStatus::Genotyping2ndAccepted, "Second genotyping run completed"),
    (KitStatus::Genotyping2ndFailed, "Second genotyping run failed"),
    (KitStatus::Hold, "Sample processing on hold"),
    (KitStatus::Process, "Genotype data delivered"),
    (KitStatus::Cancel, "Sample processing cancelled"),
    (KitStatus::Discard, "Sample discarded"),
];

/// Translate a feed code; `None` means the update should be dropped
pub fn map_external_status(code: &str) -> Option<KitStatus> {
    let code = code.trim();
    FEED_STATUS_TABLE
        .iter()
        .find(|(external, _)| external.eq_ignore_ascii_case(code))
        .map(|(_, status)| *status)
}

pub fn is_failed_status(status: KitStatus) -> bool {
    status.is_failed()
}

pub fn status_message(status: KitStatus) -> Option<&'static str> {
    STATUS_MESSAGES
        .iter()
        .find(|(s, _)| *s == status)
        .map(|(_, message)| *message)
}

/// Activity text for a feed code, mapped or not
pub fn describe_feed_status(code: &str) -> String {
    map_external_status(code)
        .and_then(status_message)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Status update: {}", code.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_state_round_trips_through_text() {
        for status in KitStatus::ALL {
            assert_eq!(status.as_str().parse::<KitStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("genotyping_accepted".parse::<KitStatus>().is_err());
    }

    #[test]
    fn test_feed_accepts_every_state_except_administrative() {
        for status in KitStatus::ALL {
            let reachable = map_external_status(status.as_str()).is_some();
            let administrative = matches!(status, KitStatus::Pending | KitStatus::Discard);
            assert_eq!(reachable, !administrative, "{status}");
        }
    }

    #[test]
    fn test_feed_codes_are_case_and_space_insensitive() {
        assert_eq!(map_external_status(" qc_passed "), Some(KitStatus::QcPassed));
        assert_eq!(map_external_status("Genotyping_2nd_Failed"), Some(KitStatus::Genotyping2ndFailed));
        assert_eq!(map_external_status("DATA_DELIVERED"), Some(KitStatus::Process));
        assert_eq!(map_external_status("UNKNOWN_CODE"), None);
        assert_eq!(map_external_status(""), None);
    }

    #[test]
    fn test_failed_states() {
        let failed: Vec<_> = KitStatus::ALL.into_iter().filter(|s| is_failed_status(*s)).collect();
        assert_eq!(
            failed,
            vec![
                KitStatus::QcFailed,
                KitStatus::DnaExtractionFailed,
                KitStatus::DnaExtraction2ndFailed,
                KitStatus::GenotypingFailed,
                KitStatus::Genotyping2ndFailed,
                KitStatus::Cancel,
                KitStatus::Discard,
            ]
        );
    }

    #[test]
    fn test_every_state_has_a_message() {
        for status in KitStatus::ALL {
            assert!(status_message(status).is_some(), "{status}");
        }
        assert_eq!(STATUS_MESSAGES.len(), KitStatus::ALL.len());
    }

    #[test]
    fn test_describe_feed_status() {
        assert_eq!(describe_feed_status("qc_failed"), "Sample failed quality control");
        assert_eq!(describe_feed_status("SHIPPED"), "Status update: SHIPPED");
    }

    #[test]
    fn test_only_genotyping_accepted_is_terminal_for_feed() {
        let terminal: Vec<_> = KitStatus::ALL.into_iter().filter(|s| s.is_terminal_for_feed()).collect();
        assert_eq!(terminal, vec![KitStatus::GenotypingAccepted]);
    }
}
