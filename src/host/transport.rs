//! HTTP transports used to reach the device.
//!
//! [`NativeTransport`] talks to the device directly (no proxy, fixed
//! connect/read timeouts). [`FetchTransport`] is the fallback and bounds the
//! whole request, body included, by the caller's deadline.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use super::constants::{NATIVE_ACCEPT, NATIVE_CONNECT_TIMEOUT_SECS, NATIVE_READ_TIMEOUT_SECS};
use crate::user_agent;

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl TransportResponse {
    /// True for `200..=299`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Error text.
    pub message: String,
    /// The deadline elapsed.
    pub timed_out: bool,
    /// The connection could not be established.
    pub connect: bool,
}

impl TransportError {
    fn from_reqwest(error: &reqwest::Error) -> Self {
        Self {
            message: error.to_string(),
            timed_out: error.is_timeout(),
            connect: error.is_connect(),
        }
    }

    fn deadline(timeout: Duration) -> Self {
        Self {
            message: format!("timeout after {} ms", timeout.as_millis()),
            timed_out: true,
            connect: false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One way of issuing a GET to the device.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Issues a GET and returns the status and body, whatever the status.
    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError>;
}

async fn read_response(response: reqwest::Response) -> Result<TransportResponse, TransportError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| TransportError::from_reqwest(&e))?;
    Ok(TransportResponse { status, body })
}

/// Direct device connection.
#[derive(Debug, Clone)]
pub struct NativeTransport {
    client: Client,
}

impl NativeTransport {
    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(NATIVE_CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(NATIVE_READ_TIMEOUT_SECS))
            .user_agent(user_agent::default_user_agent())
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for NativeTransport {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError> {
        // The caller's deadline still caps the fixed read timeout.
        let response = self
            .client
            .get(url)
            .header(ACCEPT, NATIVE_ACCEPT)
            .timeout(timeout.max(Duration::from_millis(1)))
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        read_response(response).await
    }
}

/// Fallback transport with a whole-request deadline.
#[derive(Debug, Clone)]
pub struct FetchTransport {
    client: Client,
}

impl FetchTransport {
    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent::default_user_agent())
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for FetchTransport {
    fn name(&self) -> &'static str {
        "fetch"
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError> {
        let request = async {
            let response = self
                .client
                .get(url)
                .header(CACHE_CONTROL, "no-store")
                .send()
                .await
                .map_err(|e| TransportError::from_reqwest(&e))?;
            read_response(response).await
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                debug!(url, timeout_ms = timeout.as_millis(), "fetch deadline elapsed");
                Err(TransportError::deadline(timeout))
            }
        }
    }
}
