//! Record types and status definitions.
//!
//! A [`Record`] is one normalized weight reading as produced by the ingestion
//! boundary. Once persisted it becomes a [`StoredRecord`], which adds the
//! deduplication key (`uid`), the delivery status and the creation timestamp.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder used in a synthesized uid when `codigo` is empty.
const MISSING_CODIGO: &str = "NC";
/// Placeholder used in a synthesized uid when `fecha` is empty.
const MISSING_FECHA: &str = "NF";
/// Placeholder used in a synthesized uid when `hora` is empty.
const MISSING_HORA: &str = "NH";

/// Delivery status of a stored record with respect to the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Written locally, not yet accepted by the remote.
    Pending,
    /// Confirmed by the remote.
    Synced,
    /// Rejected or the send attempt failed; waits for a manual re-sync.
    Failed,
}

impl RecordStatus {
    /// Returns the persisted string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid record status: {s}")),
        }
    }
}

/// Milking shift of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Turno {
    /// Morning shift.
    Am,
    /// Afternoon/evening shift.
    Pm,
    /// Shift not reported by the device.
    #[default]
    Unspecified,
}

impl Turno {
    /// Parses a shift label case-insensitively; unknown labels are `Unspecified`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "am" => Self::Am,
            "pm" => Self::Pm,
            _ => Self::Unspecified,
        }
    }

    /// Returns the persisted string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Am => "am",
            Self::Pm => "pm",
            Self::Unspecified => "",
        }
    }
}

impl fmt::Display for Turno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Turno {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Turno {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// A normalized weight reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Explicit identifier supplied by the device, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Animal code.
    pub codigo: String,
    /// Measured weight, never negative.
    pub peso: f64,
    /// Reading date as `dd/mm/yyyy`.
    pub fecha: String,
    /// Reading time as `HH:MM`.
    pub hora: String,
    /// Milking shift.
    #[serde(default)]
    pub turno: Turno,
    /// Original serialized payload, kept for audit and forwarding.
    pub raw: String,
}

impl Record {
    /// Returns the deduplication key for this record.
    ///
    /// An explicit non-empty `id` is used verbatim; otherwise the key is
    /// `codigo|fecha|hora` with placeholders for empty fields.
    #[must_use]
    pub fn uid(&self) -> String {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        format!(
            "{}|{}|{}",
            non_empty_or(&self.codigo, MISSING_CODIGO),
            non_empty_or(&self.fecha, MISSING_FECHA),
            non_empty_or(&self.hora, MISSING_HORA)
        )
    }
}

/// Returns the deduplication key for `record`. See [`Record::uid`].
#[must_use]
pub fn uid_for(record: &Record) -> String {
    record.uid()
}

fn non_empty_or<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() { placeholder } else { value }
}

/// Clamps a measured weight to a finite, non-negative value.
#[must_use]
pub fn sanitize_peso(peso: f64) -> f64 {
    if peso.is_finite() && peso > 0.0 {
        peso
    } else {
        0.0
    }
}

/// A record as persisted by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Explicit id, or the uid when the device supplied none.
    pub id: String,
    /// Animal code.
    pub codigo: String,
    /// Measured weight.
    pub peso: f64,
    /// Reading date as `dd/mm/yyyy`.
    pub fecha: String,
    /// Reading time as `HH:MM`.
    pub hora: String,
    /// Milking shift.
    #[serde(default)]
    pub turno: Turno,
    /// Original serialized payload.
    pub raw: String,
    /// Deduplication key, unique across the store.
    pub uid: String,
    /// Delivery status.
    pub status: RecordStatus,
    /// ISO-8601 creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl StoredRecord {
    /// Builds a new pending stored record from a normalized record.
    #[must_use]
    pub fn pending(record: &Record, uid: String, created_at: String) -> Self {
        let raw = if record.raw.is_empty() {
            serde_json::to_string(record).unwrap_or_default()
        } else {
            record.raw.clone()
        };
        Self {
            id: record
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uid.clone()),
            codigo: record.codigo.clone(),
            peso: sanitize_peso(record.peso),
            fecha: record.fecha.clone(),
            hora: record.hora.clone(),
            turno: record.turno,
            raw,
            uid,
            status: RecordStatus::Pending,
            created_at,
        }
    }

    /// Returns the payload to forward to the remote server.
    ///
    /// Uses `raw` when present, otherwise the JSON serialization of the record.
    #[must_use]
    pub fn forward_payload(&self) -> String {
        if self.raw.trim().is_empty() {
            serde_json::to_string(self).unwrap_or_default()
        } else {
            self.raw.clone()
        }
    }
}

impl fmt::Display for StoredRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {:>8.2} {:<2} {}",
            self.uid, self.codigo, self.fecha, self.hora, self.peso, self.turno, self.status
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(codigo: &str, fecha: &str, hora: &str) -> Record {
        Record {
            id: None,
            codigo: codigo.to_string(),
            peso: 12.5,
            fecha: fecha.to_string(),
            hora: hora.to_string(),
            turno: Turno::Am,
            raw: String::new(),
        }
    }

    #[test]
    fn test_record_status_from_str_valid() {
        assert_eq!(
            "pending".parse::<RecordStatus>().unwrap(),
            RecordStatus::Pending
        );
        assert_eq!(
            "synced".parse::<RecordStatus>().unwrap(),
            RecordStatus::Synced
        );
        assert_eq!(
            "failed".parse::<RecordStatus>().unwrap(),
            RecordStatus::Failed
        );
    }

    #[test]
    fn test_record_status_from_str_invalid() {
        let result = "in_progress".parse::<RecordStatus>();
        assert!(result.unwrap_err().contains("invalid record status"));
    }

    #[test]
    fn test_record_status_serializes_lowercase() {
        let json = serde_json::to_string(&RecordStatus::Synced).unwrap();
        assert_eq!(json, "\"synced\"");
    }

    #[test]
    fn test_turno_parse_is_case_insensitive() {
        assert_eq!(Turno::parse("AM"), Turno::Am);
        assert_eq!(Turno::parse(" pm "), Turno::Pm);
        assert_eq!(Turno::parse("noche"), Turno::Unspecified);
        assert_eq!(Turno::parse(""), Turno::Unspecified);
    }

    #[test]
    fn test_turno_serializes_as_plain_string() {
        assert_eq!(serde_json::to_string(&Turno::Pm).unwrap(), "\"pm\"");
        assert_eq!(serde_json::to_string(&Turno::Unspecified).unwrap(), "\"\"");
        let parsed: Turno = serde_json::from_str("\"AM\"").unwrap();
        assert_eq!(parsed, Turno::Am);
    }

    #[test]
    fn test_uid_is_composite_without_explicit_id() {
        let r = record("V001", "01/03/2024", "06:00");
        assert_eq!(r.uid(), "V001|01/03/2024|06:00");
    }

    #[test]
    fn test_uid_uses_placeholders_for_missing_fields() {
        let r = record("", "", "");
        assert_eq!(r.uid(), "NC|NF|NH");
        let r = record("V002", "", "07:15");
        assert_eq!(r.uid(), "V002|NF|07:15");
    }

    #[test]
    fn test_uid_prefers_explicit_id() {
        let mut r = record("V001", "01/03/2024", "06:00");
        r.id = Some("abc-42".to_string());
        assert_eq!(r.uid(), "abc-42");
    }

    #[test]
    fn test_uid_for_matches_method() {
        let r = record("V001", "01/03/2024", "06:00");
        assert_eq!(uid_for(&r), r.uid());
    }

    #[test]
    fn test_uid_ignores_empty_explicit_id() {
        let mut r = record("V001", "01/03/2024", "06:00");
        r.id = Some(String::new());
        assert_eq!(r.uid(), "V001|01/03/2024|06:00");
    }

    #[test]
    fn test_sanitize_peso_clamps_invalid_values() {
        assert!((sanitize_peso(-3.0) - 0.0).abs() < f64::EPSILON);
        assert!((sanitize_peso(f64::NAN) - 0.0).abs() < f64::EPSILON);
        assert!((sanitize_peso(f64::INFINITY) - 0.0).abs() < f64::EPSILON);
        assert!((sanitize_peso(12.5) - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stored_record_pending_defaults_id_to_uid() {
        let r = record("V001", "01/03/2024", "06:00");
        let stored = StoredRecord::pending(&r, r.uid(), "2024-03-01T06:00:00Z".to_string());
        assert_eq!(stored.id, "V001|01/03/2024|06:00");
        assert_eq!(stored.status, RecordStatus::Pending);
        assert!(!stored.raw.is_empty(), "raw falls back to serialized record");
    }

    #[test]
    fn test_stored_record_json_uses_created_at_camel_case() {
        let r = record("V001", "01/03/2024", "06:00");
        let stored = StoredRecord::pending(&r, r.uid(), "2024-03-01T06:00:00Z".to_string());
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["createdAt"], "2024-03-01T06:00:00Z");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["turno"], "am");
    }

    #[test]
    fn test_forward_payload_prefers_raw() {
        let mut r = record("V001", "01/03/2024", "06:00");
        r.raw = r#"{"codigo":"V001"}"#.to_string();
        let stored = StoredRecord::pending(&r, r.uid(), "t".to_string());
        assert_eq!(stored.forward_payload(), r#"{"codigo":"V001"}"#);
    }
}
