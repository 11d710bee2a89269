//! The status index blob: uid -> `{status, createdAt}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{RecordStatus, StoredRecord};

/// Index metadata kept for one stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Delivery status mirrored from the body.
    pub status: RecordStatus,
    /// Creation timestamp mirrored from the body.
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl IndexEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(status: RecordStatus, created_at: impl Into<String>) -> Self {
        Self {
            status,
            created_at: created_at.into(),
        }
    }
}

impl From<&StoredRecord> for IndexEntry {
    fn from(record: &StoredRecord) -> Self {
        Self::new(record.status, record.created_at.clone())
    }
}

/// Ordered uid -> entry mapping, persisted as one JSON object.
pub type Index = BTreeMap<String, IndexEntry>;

/// Decodes an index blob. Blank input is an empty index.
///
/// # Errors
///
/// Returns the JSON error when the blob is not a valid index object.
pub fn parse_index(raw: &str) -> Result<Index, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Index::new());
    }
    serde_json::from_str(raw)
}

/// Encodes an index blob.
///
/// # Errors
///
/// Returns the JSON error if serialization fails.
pub fn serialize_index(index: &Index) -> Result<String, serde_json::Error> {
    serde_json::to_string(index)
}

/// Returns the uids whose entry has `status`, in key order.
#[must_use]
pub fn uids_with_status(index: &Index, status: RecordStatus) -> Vec<String> {
    index
        .iter()
        .filter(|(_, entry)| entry.status == status)
        .map(|(uid, _)| uid.clone())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_blank_is_empty() {
        assert!(parse_index("").unwrap().is_empty());
        assert!(parse_index("   ").unwrap().is_empty());
    }

    #[test]
    fn test_index_json_layout() {
        let mut index = Index::new();
        index.insert(
            "V001|01/03/2024|06:00".to_string(),
            IndexEntry::new(RecordStatus::Pending, "2024-03-01T06:00:00.000Z"),
        );
        let json = serialize_index(&index).unwrap();
        assert_eq!(
            json,
            r#"{"V001|01/03/2024|06:00":{"status":"pending","createdAt":"2024-03-01T06:00:00.000Z"}}"#
        );
        assert_eq!(parse_index(&json).unwrap(), index);
    }

    #[test]
    fn test_parse_index_rejects_garbage() {
        assert!(parse_index("{not json").is_err());
        assert!(parse_index(r#"{"a":{"status":"lost","createdAt":""}}"#).is_err());
    }

    #[test]
    fn test_uids_with_status_filters() {
        let mut index = Index::new();
        index.insert("a".into(), IndexEntry::new(RecordStatus::Pending, "t"));
        index.insert("b".into(), IndexEntry::new(RecordStatus::Synced, "t"));
        index.insert("c".into(), IndexEntry::new(RecordStatus::Pending, "t"));
        assert_eq!(
            uids_with_status(&index, RecordStatus::Pending),
            vec!["a".to_string(), "c".to_string()]
        );
    }
}
