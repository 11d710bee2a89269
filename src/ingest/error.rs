//! Error types for payload ingestion.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that abort an ingestion call.
///
/// Malformed lines or items never reach this type; they are skipped and
/// counted in [`super::IngestReport`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload is an HTML document, not record data.
    #[error(
        "payload looks like an HTML page ({preview})\n  Suggestion: Check the device host; it answered with a web page instead of records"
    )]
    HtmlPayload {
        /// First characters of the payload for display.
        preview: String,
    },

    /// Persisting the parsed records failed.
    #[error("failed to store records: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Creates an `HtmlPayload` error with a short preview of the text.
    #[must_use]
    pub fn html(text: &str) -> Self {
        Self::HtmlPayload {
            preview: text.trim().chars().take(40).collect(),
        }
    }
}
