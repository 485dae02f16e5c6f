//! # HTTP Transport
//!
//! Posts serialized records to the collector's ingest endpoint.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::Transport;
use crate::error::{RelayError, Result, TransportError};

/// Ingest path on the collector
pub const MEASUREMENTS_PATH: &str = "/api/v1/measurements";

/// Header carrying the pre-shared credential
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// HTTP client for one collector endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Create a transport for `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - Collector root, e.g. `http://10.0.2.2:5000`
    /// * `api_key` - Sent as `X-API-KEY` when present and non-empty
    /// * `timeout` - Upper bound for one request, connect included
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Http` if the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cellprobe::transport::HttpTransport;
    /// use std::time::Duration;
    ///
    /// let transport = HttpTransport::new("http://localhost:5000", None, Duration::from_secs(5))?;
    /// assert_eq!(transport.url(), "http://localhost:5000/api/v1/measurements");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(RelayError::Http)?;

        Ok(Self {
            client,
            url: endpoint_url(base_url),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Full ingest URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: Bytes) -> std::result::Result<(), TransportError> {
        let size = payload.len();
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        debug!("POST {} ({} bytes) -> {}", self.url, size, status);
        classify_status(status)
    }
}

/// Join the collector root and the ingest path
fn endpoint_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), MEASUREMENTS_PATH)
}

/// 2xx and 3xx are accepted, everything else is a failure
fn classify_status(status: u16) -> std::result::Result<(), TransportError> {
    if (200..400).contains(&status) {
        Ok(())
    } else {
        Err(TransportError::Status(status))
    }
}
