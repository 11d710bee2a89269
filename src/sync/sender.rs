//! Delivery of one record to the remote server.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{SEND_CONNECT_TIMEOUT_SECS, SEND_REQUEST_TIMEOUT_SECS};
use crate::record::StoredRecord;
use crate::user_agent;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The remote accepted the record.
    Sent,
    /// Temporary failure (5xx, transport error); may succeed later.
    Retryable(String),
    /// The remote rejected the record (4xx and other statuses).
    Permanent(String),
}

/// Errors raised by a sender instead of an outcome.
#[derive(Debug, Error)]
pub enum SendError {
    /// The remote URL cannot be used.
    #[error("invalid remote sync URL '{url}': {reason}\n  Suggestion: Use an http:// or https:// URL, e.g. remote_sync_url = https://example.com/api/registros")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The sender failed before producing an outcome.
    #[error("failed to send record {uid}: {message}")]
    Failed {
        /// The record being sent.
        uid: String,
        /// What went wrong.
        message: String,
    },
}

/// Pushes one record to the remote.
///
/// Returning `Err` means the attempt blew up; the sync pool treats it like a
/// failed delivery.
#[async_trait]
pub trait RecordSender: Send + Sync + fmt::Debug {
    /// Sends one record.
    async fn send_one(&self, record: &StoredRecord) -> Result<SendOutcome, SendError>;
}

/// Maps a remote HTTP status to an outcome.
#[must_use]
pub fn classify_status(status: u16) -> SendOutcome {
    match status {
        200..=299 => SendOutcome::Sent,
        500..=599 => SendOutcome::Retryable(format!("HTTP {status}")),
        _ => SendOutcome::Permanent(format!("HTTP {status}")),
    }
}

/// POSTs record payloads as JSON to a configured URL.
#[derive(Debug, Clone)]
pub struct HttpRecordSender {
    client: Client,
    url: Url,
}

impl HttpRecordSender {
    /// Creates a sender for `remote_url` with the default timeouts.
    ///
    /// - Connect timeout: 10 seconds
    /// - Request timeout: 30 seconds
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidUrl`] when the URL is malformed or not
    /// `http`/`https`, or when the HTTP client cannot be built.
    pub fn new(remote_url: &str) -> Result<Self, SendError> {
        Self::with_timeouts(
            remote_url,
            Duration::from_secs(SEND_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(SEND_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Creates a sender with explicit connect and whole-request timeouts.
    /// A delivery that exceeds either one is reported as retryable.
    ///
    /// # Errors
    ///
    /// Same as [`HttpRecordSender::new`].
    pub fn with_timeouts(
        remote_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, SendError> {
        let invalid = |reason: String| SendError::InvalidUrl {
            url: remote_url.to_string(),
            reason,
        };
        let url = Url::parse(remote_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("scheme '{}' is not supported", url.scheme())));
        }

        let client = Client::builder()
            .user_agent(user_agent::default_user_agent())
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self { client, url })
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RecordSender for HttpRecordSender {
    #[instrument(skip(self, record), fields(uid = %record.uid))]
    async fn send_one(&self, record: &StoredRecord) -> Result<SendOutcome, SendError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(record.forward_payload())
            .send()
            .await;

        match response {
            Ok(response) => {
                let outcome = classify_status(response.status().as_u16());
                debug!(status = response.status().as_u16(), ?outcome, "remote answered");
                Ok(outcome)
            }
            Err(e) => {
                debug!(error = %e, "transport error sending record");
                Ok(SendOutcome::Retryable(e.to_string()))
            }
        }
    }
}
