//! Ingestion of device payloads into the record store.
//!
//! Accepts a single JSON value (array, `{"records": [...]}`, `{"record": {...}}`
//! or a bare object) or, when the whole text is not one JSON value,
//! newline-delimited JSON. Firmware versions differ in which shape they emit,
//! so callers never choose a format.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use registros_core::ingest::Ingestor;
//! use registros_core::store::{MemoryBackend, RecordStore};
//!
//! # async fn example() {
//! let ingestor = Ingestor::new(RecordStore::new(Arc::new(MemoryBackend::new())));
//! let added = ingestor
//!     .add_new_records(r#"{"codigo":"V001","peso":12.5,"fecha":"01/03/2024","hora":"06:00"}"#)
//!     .await;
//! assert_eq!(added, 1);
//! # }
//! ```

mod error;
mod shape;

pub use error::IngestError;
pub use shape::normalize;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::record::Record;
use crate::store::RecordStore;

/// Byte-order mark some devices prepend to their responses.
const BOM: char = '\u{feff}';

#[allow(clippy::expect_used)]
static HTML_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<<?html|<head|<body").expect("HTML marker regex is valid")
});

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Items normalized into records.
    pub parsed: usize,
    /// Records newly stored.
    pub added: usize,
    /// Records already present.
    pub skipped: usize,
    /// JSON-lines entries that failed to parse, plus non-object items.
    pub invalid_lines: usize,
}

/// Items extracted from a payload before normalization.
#[derive(Debug, Default)]
pub struct ParsedPayload {
    pub items: Vec<Value>,
    pub invalid_lines: usize,
}

/// Returns true when the text contains HTML document markers.
#[must_use]
pub fn looks_like_html(text: &str) -> bool {
    HTML_MARKER.is_match(text)
}

/// Splits a payload into JSON items.
///
/// Tries the whole text as one JSON value first and falls back to one value
/// per non-blank line.
#[must_use]
pub fn parse_payload(text: &str) -> ParsedPayload {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => ParsedPayload {
            items: unwrap_envelope(value),
            invalid_lines: 0,
        },
        Err(whole_error) => {
            debug!(error = %whole_error, "payload is not one JSON value, reading as JSON lines");
            parse_lines(text)
        }
    }
}

fn unwrap_envelope(value: Value) -> Vec<Value> {
    match value {
        Value::Array(mut items) => {
            if items.len() == 1 && items[0].is_array() {
                if let Some(Value::Array(inner)) = items.pop() {
                    return inner;
                }
            }
            items
        }
        Value::Object(mut object) => {
            if matches!(object.get("records"), Some(Value::Array(_))) {
                if let Some(Value::Array(records)) = object.remove("records") {
                    return records;
                }
            }
            if matches!(object.get("record"), Some(Value::Object(_))) {
                if let Some(record) = object.remove("record") {
                    return vec![record];
                }
            }
            vec![Value::Object(object)]
        }
        scalar => {
            debug!(kind = %json_kind(&scalar), "payload is a JSON scalar, no records");
            Vec::new()
        }
    }
}

fn parse_lines(text: &str) -> ParsedPayload {
    let mut parsed = ParsedPayload::default();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => parsed.items.push(value),
            Err(e) => {
                parsed.invalid_lines += 1;
                warn!(line = number + 1, error = %e, "skipping malformed JSON line");
            }
        }
    }
    parsed
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses payloads and writes unseen records to a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: RecordStore,
}

impl Ingestor {
    /// Creates an ingestor writing into `store`.
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Parses `text` and stores the records it contains.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::HtmlPayload`] for HTML documents (nothing is
    /// written) and [`IngestError::Store`] when the store rejects the batch.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn ingest(&self, text: &str) -> Result<IngestReport, IngestError> {
        let text = text.strip_prefix(BOM).unwrap_or(text);
        if looks_like_html(text) {
            return Err(IngestError::html(text));
        }

        let payload = parse_payload(text);
        let mut report = IngestReport {
            invalid_lines: payload.invalid_lines,
            ..IngestReport::default()
        };

        let records: Vec<Record> = payload
            .items
            .iter()
            .filter_map(|item| {
                let record = normalize(item);
                if record.is_none() {
                    report.invalid_lines += 1;
                    warn!(kind = json_kind(item), "skipping non-object item");
                }
                record
            })
            .collect();
        report.parsed = records.len();

        if !records.is_empty() {
            let written = self.store.write(&records).await?;
            report.added = written.added;
            report.skipped = written.skipped;
        }

        info!(
            parsed = report.parsed,
            added = report.added,
            skipped = report.skipped,
            invalid = report.invalid_lines,
            "payload ingested"
        );
        Ok(report)
    }

    /// Stores the records in `text` and returns how many were new.
    ///
    /// Failures are logged and reported as 0 added.
    pub async fn add_new_records(&self, text: &str) -> usize {
        match self.ingest(text).await {
            Ok(report) => report.added,
            Err(e) => {
                warn!(error = %e, "ingestion rejected payload");
                0
            }
        }
    }
}
