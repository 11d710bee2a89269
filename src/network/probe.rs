//! Connectivity probes consulted by the network monitor.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

/// Errors raised while probing connectivity.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// The probe target cannot be used.
    #[error("invalid probe target '{target}': {reason}")]
    InvalidTarget {
        /// The rejected target.
        target: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The platform signal could not be read.
    #[error("connectivity probe failed: {0}")]
    Unavailable(String),
}

/// Platform connectivity signal.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync + fmt::Debug {
    /// Prepares the probe; `false` means it is unavailable on this platform.
    async fn init(&self) -> bool;

    /// Reports whether the network is reachable right now.
    async fn is_connected(&self) -> Result<bool, ProbeError>;
}

/// Probes reachability by opening a TCP connection to the data host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    /// Creates a probe for `host:port`.
    #[must_use]
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    /// Creates a probe for the socket address of a host URL such as
    /// `http://192.168.4.1`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::InvalidTarget`] if the URL has no host or port.
    pub fn for_host_url(url: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let invalid = |reason: String| ProbeError::InvalidTarget {
            target: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| invalid("URL has no host".to_string()))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| invalid("URL has no port".to_string()))?;
        Ok(Self::new(format!("{host}:{port}"), timeout))
    }

    /// Target socket address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn init(&self) -> bool {
        match tokio::net::lookup_host(&self.address).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!(address = %self.address, error = %e, "probe target does not resolve");
                false
            }
        }
    }

    async fn is_connected(&self) -> Result<bool, ProbeError> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => {
                debug!(address = %self.address, error = %e, "probe connection failed");
                Ok(false)
            }
            Err(_) => {
                debug!(address = %self.address, "probe connection timed out");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_for_host_url_uses_default_port() {
        let probe = TcpProbe::for_host_url("http://192.168.4.1", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.address(), "192.168.4.1:80");
        let probe =
            TcpProbe::for_host_url("https://scale.local:8443/data", Duration::from_secs(1))
                .unwrap();
        assert_eq!(probe.address(), "scale.local:8443");
    }

    #[test]
    fn test_for_host_url_rejects_garbage() {
        assert!(matches!(
            TcpProbe::for_host_url("not a url", Duration::from_secs(1)),
            Err(ProbeError::InvalidTarget { .. })
        ));
    }

    #[tokio::test]
    async fn test_tcp_probe_connects_to_listener() {
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            eprintln!("[socket-bound-test] cannot bind localhost socket; skipping");
            return;
        };
        let address = listener.local_addr().unwrap().to_string();
        let probe = TcpProbe::new(address, Duration::from_secs(1));

        assert!(probe.init().await);
        assert!(probe.is_connected().await.unwrap());

        drop(listener);
        assert!(!probe.is_connected().await.unwrap());
    }
}
