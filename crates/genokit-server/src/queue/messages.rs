//! Message bodies carried on the two queues

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::StatusUpdate;

/// Notification that a genotype file landed in object storage.
/// Fields other than `bucket` and `key` (`source`, `size`, `etag`...) are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileReadyMessage {
    #[serde(default, deserialize_with = "lenient_string")]
    pub bucket: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: Option<String>,
}

impl FileReadyMessage {
    /// Bucket and key, when both are present and non-blank
    pub fn location(&self) -> Option<(&str, &str)> {
        let bucket = non_blank(self.bucket.as_deref())?;
        let key = non_blank(self.key.as_deref())?;
        Some((bucket, key))
    }
}

/// Lab-status feed entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LabStatusMessage {
    #[serde(default, deserialize_with = "lenient_string")]
    pub sample_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub comment: Option<String>,
}

impl LabStatusMessage {
    /// Validated update; `None` when `sample_id` or `status` is missing.
    /// A missing timestamp defaults to `now`, a missing comment to "".
    pub fn into_update(self, now: DateTime<Utc>) -> Option<StatusUpdate> {
        let sample_id = non_blank(self.sample_id.as_deref())?.to_string();
        let status = non_blank(self.status.as_deref())?.to_string();
        Some(StatusUpdate {
            sample_id,
            status,
            timestamp: non_blank(self.timestamp.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            comment: self.comment.unwrap_or_default(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Strings pass through; numbers are rendered; null and anything else is absent
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_ready_ignores_extra_fields() {
        let msg: FileReadyMessage = serde_json::from_str(
            r#"{"bucket":"lab","key":"pending/S1.txt","source":"partner","size":1024,"etag":"x"}"#,
        )
        .unwrap();
        assert_eq!(msg.location(), Some(("lab", "pending/S1.txt")));
    }

    #[test]
    fn test_file_ready_requires_both_fields() {
        let msg: FileReadyMessage = serde_json::from_str(r#"{"bucket":"lab"}"#).unwrap();
        assert_eq!(msg.location(), None);
        let msg: FileReadyMessage = serde_json::from_str(r#"{"bucket":"lab","key":"  "}"#).unwrap();
        assert_eq!(msg.location(), None);
        let msg: FileReadyMessage = serde_json::from_str(r#"{"bucket":null,"key":"k"}"#).unwrap();
        assert_eq!(msg.location(), None);
    }

    #[test]
    fn test_lab_status_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let msg: LabStatusMessage =
            serde_json::from_str(r#"{"sample_id":"S1","status":"QC_PASSED"}"#).unwrap();
        let update = msg.into_update(now).unwrap();

        assert_eq!(update.sample_id, "S1");
        assert_eq!(update.status, "QC_PASSED");
        assert_eq!(update.timestamp, "2024-01-02T03:04:05.000Z");
        assert_eq!(update.comment, "");
    }

    #[test]
    fn test_lab_status_keeps_given_values() {
        let msg: LabStatusMessage = serde_json::from_str(
            r#"{"sample_id":12345,"status":"QC_FAILED","timestamp":"2024-03-01T10:00:00Z","comment":"low yield"}"#,
        )
        .unwrap();
        let update = msg.into_update(Utc::now()).unwrap();

        assert_eq!(update.sample_id, "12345");
        assert_eq!(update.timestamp, "2024-03-01T10:00:00Z");
        assert_eq!(update.comment, "low yield");
    }

    #[test]
    fn test_lab_status_requires_sample_and_status() {
        let msg: LabStatusMessage = serde_json::from_str(r#"{"status":"QC_PASSED"}"#).unwrap();
        assert!(msg.into_update(Utc::now()).is_none());
        let msg: LabStatusMessage = serde_json::from_str(r#"{"sample_id":"S1","status":""}"#).unwrap();
        assert!(msg.into_update(Utc::now()).is_none());
    }
}
