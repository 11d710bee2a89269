//! Failure classification for device downloads.
//!
//! A failed probe is classified into a [`FailureKind`]:
//!
//! | Observation | Kind |
//! |-------------|------|
//! | Timeout, refused/reset connection, DNS failure | `Network` |
//! | Cross-origin rejection (`cors`, `access-control`) | `Cors` |
//! | Response outside `200..=299` | `Http` |
//! | `2xx` with a blank body | `Empty` |
//! | Anything else | `Other` |

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::transport::TransportError;

#[allow(clippy::expect_used)]
static NETWORK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)timeout|timed out|network|failed to fetch|connect|refused|reset|unreachable|dns|resolve",
    )
    .expect("network pattern regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static CORS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cors|access-control|cross-origin")
        .expect("CORS pattern regex is valid") // Static pattern, safe to panic
});

/// Why a download attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Connectivity problem: timeout, refused connection, DNS.
    Network,
    /// Cross-origin rejection.
    Cors,
    /// Non-2xx HTTP status.
    Http,
    /// Successful status with nothing in the body.
    Empty,
    /// Unclassified failure (including invalid hosts).
    Other,
}

impl FailureKind {
    /// Returns the stable label for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cors => "cors",
            Self::Http => "http",
            Self::Empty => "empty",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a transport error from its flags, then its message.
#[must_use]
pub fn classify_transport_error(error: &TransportError) -> FailureKind {
    if error.timed_out || error.connect {
        return FailureKind::Network;
    }
    if CORS_PATTERN.is_match(&error.message) {
        FailureKind::Cors
    } else if NETWORK_PATTERN.is_match(&error.message) {
        FailureKind::Network
    } else {
        FailureKind::Other
    }
}

/// Terminal failure of a download or an individual probe.
#[derive(Debug, Clone, Error)]
#[error("{kind} error downloading {url}: {message}")]
pub struct HostError {
    /// Classification.
    pub kind: FailureKind,
    /// URL of the attempt that produced this error.
    pub url: String,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Underlying error text.
    pub message: String,
}

impl HostError {
    /// Creates an error of the given kind.
    pub fn new(kind: FailureKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self {
            kind: FailureKind::Http,
            url: url.into(),
            status: Some(status),
            message: format!("HTTP {status}"),
        }
    }

    /// Creates an empty-body error.
    pub fn empty(url: impl Into<String>, status: u16) -> Self {
        Self {
            kind: FailureKind::Empty,
            url: url.into(),
            status: Some(status),
            message: "empty response body".to_string(),
        }
    }

    /// Creates an error from a transport failure.
    pub fn transport(url: impl Into<String>, error: &TransportError) -> Self {
        Self::new(classify_transport_error(error), url, error.message.clone())
    }

    /// Creates an error for a host that cannot be turned into a URL.
    pub fn invalid_host(host: impl Into<String>, reason: impl fmt::Display) -> Self {
        let host = host.into();
        Self::new(FailureKind::Other, host, format!("invalid host: {reason}"))
    }

    /// Short status line for the user, distinguishing connectivity,
    /// cross-origin, and generic failures.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::Network => {
                "Cannot reach the scale. Check that this device is on the scale's Wi-Fi network."
                    .to_string()
            }
            FailureKind::Cors => {
                "The scale rejected the request (cross-origin). Use the native transport."
                    .to_string()
            }
            FailureKind::Http | FailureKind::Empty | FailureKind::Other => {
                format!("Download failed: {}", self.message)
            }
        }
    }
}
