//! Device downloader: multi-path, dual-transport probing.
//!
//! For every candidate path, in order, the native transport is tried first
//! and the fetch transport second. The first `2xx` response with a
//! non-blank body wins. When everything fails, the last classified failure
//! is returned; a blank-body success is only reported when nothing worse was
//! seen.
//!
//! # Example
//!
//! ```no_run
//! use registros_core::host::HostDownloader;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = HostDownloader::with_default_transports()?;
//! match downloader.download_from_host("192.168.4.1", 10_000).await {
//!     Ok(payload) => println!("{} bytes from {}", payload.text.len(), payload.url),
//!     Err(e) => eprintln!("{}", e.user_message()),
//! }
//! # Ok(())
//! # }
//! ```

mod constants;
mod error;
mod transport;

pub use constants::{
    CANDIDATE_PATHS, CONFIRM_PATH, DEFAULT_CONFIRM_TIMEOUT_MS, DEFAULT_DOWNLOAD_TIMEOUT_MS,
    DEFAULT_HOST,
};
pub use error::{FailureKind, HostError, classify_transport_error};
pub use transport::{
    FetchTransport, NativeTransport, Transport, TransportError, TransportResponse,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

/// A successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPayload {
    /// Response body.
    pub text: String,
    /// URL that produced it.
    pub url: String,
    /// HTTP status of the response.
    pub status: u16,
}

/// Normalizes a user-entered host into a base URL without trailing slash.
///
/// Trims whitespace, strips trailing slashes and prepends `http://` when no
/// scheme is present.
///
/// # Errors
///
/// Returns a [`FailureKind::Other`] error when the result is not an
/// `http`/`https` URL with a host.
pub fn normalize_host(host: &str) -> Result<String, HostError> {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(HostError::invalid_host(host, "empty host"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = Url::parse(&candidate).map_err(|e| HostError::invalid_host(host, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(HostError::invalid_host(
            host,
            format!("scheme '{}' is not supported", parsed.scheme()),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(HostError::invalid_host(host, "URL has no host"));
    }
    Ok(candidate)
}

/// Records failures across probes and picks the one to report.
#[derive(Debug, Default)]
struct FailureTracker {
    last_hard: Option<HostError>,
    last_empty: Option<HostError>,
}

impl FailureTracker {
    fn record(&mut self, error: HostError) {
        debug!(kind = %error.kind, url = %error.url, message = %error.message, "probe failed");
        if error.kind == FailureKind::Empty {
            self.last_empty = Some(error);
        } else {
            self.last_hard = Some(error);
        }
    }

    fn into_error(self, base: &str) -> HostError {
        self.last_hard
            .or(self.last_empty)
            .unwrap_or_else(|| HostError::new(FailureKind::Other, base, "no candidate paths"))
    }
}

/// Downloads raw record text from the scale device.
#[derive(Debug, Clone)]
pub struct HostDownloader {
    native: Arc<dyn Transport>,
    fetch: Arc<dyn Transport>,
}

impl HostDownloader {
    /// Creates a downloader with explicit transports (tests inject fakes).
    #[must_use]
    pub fn new(native: Arc<dyn Transport>, fetch: Arc<dyn Transport>) -> Self {
        Self { native, fetch }
    }

    /// Creates a downloader with the reqwest-backed transports.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if an HTTP client cannot be built.
    pub fn with_default_transports() -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            Arc::new(NativeTransport::new()?),
            Arc::new(FetchTransport::new()?),
        ))
    }

    /// One transport attempt; `Ok` only for a 2xx with a non-blank body.
    async fn attempt(
        &self,
        transport: &dyn Transport,
        url: &str,
        timeout: Duration,
    ) -> Result<HostPayload, HostError> {
        match transport.get(url, timeout).await {
            Ok(response) if !response.is_success() => {
                Err(HostError::http_status(url, response.status))
            }
            Ok(response) if response.body.trim().is_empty() => {
                Err(HostError::empty(url, response.status))
            }
            Ok(response) => Ok(HostPayload {
                text: response.body,
                url: url.to_string(),
                status: response.status,
            }),
            Err(e) => Err(HostError::transport(url, &e)),
        }
    }

    /// Probes the candidate paths on `host` and returns the first non-empty body.
    ///
    /// # Errors
    ///
    /// Returns the last classified [`HostError`] when every path and
    /// transport failed, or a [`FailureKind::Other`] error for an invalid host
    /// (no request is made).
    #[instrument(skip(self))]
    pub async fn download_from_host(
        &self,
        host: &str,
        timeout_ms: u64,
    ) -> Result<HostPayload, HostError> {
        let base = normalize_host(host)?;
        let timeout = Duration::from_millis(timeout_ms);
        let mut failures = FailureTracker::default();

        for path in CANDIDATE_PATHS {
            let url = format!("{base}{path}");
            for transport in [&self.native, &self.fetch] {
                match self.attempt(transport.as_ref(), &url, timeout).await {
                    Ok(payload) => {
                        info!(
                            url = %payload.url,
                            status = payload.status,
                            transport = transport.name(),
                            bytes = payload.text.len(),
                            "downloaded records from host"
                        );
                        return Ok(payload);
                    }
                    Err(e) => failures.record(e),
                }
            }
        }

        let error = failures.into_error(&base);
        warn!(kind = %error.kind, url = %error.url, message = %error.message, "download from host failed");
        Err(error)
    }

    /// Acknowledges a completed download to the device.
    ///
    /// Sends `GET {host}/confirmar` through both transports; if neither gets
    /// a `2xx`, falls back to the probing strategy. Never errors.
    #[instrument(skip(self))]
    pub async fn confirm_host(&self, host: &str, timeout_ms: u64) -> bool {
        let base = match normalize_host(host) {
            Ok(base) => base,
            Err(e) => {
                warn!(error = %e, "cannot confirm with invalid host");
                return false;
            }
        };
        let timeout = Duration::from_millis(timeout_ms);
        let url = format!("{base}{CONFIRM_PATH}");

        for transport in [&self.native, &self.fetch] {
            match transport.get(&url, timeout).await {
                Ok(response) if response.is_success() => {
                    info!(url = %url, transport = transport.name(), "host confirmed");
                    return true;
                }
                Ok(response) => {
                    debug!(url = %url, status = response.status, "confirmation rejected");
                }
                Err(e) => debug!(url = %url, error = %e, "confirmation request failed"),
            }
        }

        let confirmed = self.download_from_host(&base, timeout_ms).await.is_ok();
        debug!(confirmed, "confirmation via probing");
        confirmed
    }
}
