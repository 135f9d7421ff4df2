//! HTTP half of the connection.
//!
//! One-shot JSON-RPC calls are POSTed to the node's HTTP endpoint. The
//! [`HttpTransport`] trait is the seam between the dispatcher and the
//! network; [`ReqwestTransport`] is the production implementation and keeps
//! a pooled `reqwest::Client`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// TCP connect timeout for the pooled client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// HttpTransport
// ============================================================================

/// Posts a serialized JSON-RPC body and returns the raw response body.
///
/// Implementations must not interpret the JSON-RPC layer; status codes other
/// than success are reported as [`Error::Transport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request body to `url`.
    async fn post(&self, url: &Url, body: String) -> Result<String>;
}

// ============================================================================
// ReqwestTransport
// ============================================================================

/// [`HttpTransport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds the pooled client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the TLS backend fails to initialize.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, url: &Url, body: String) -> Result<String> {
        trace!(%url, bytes = body.len(), "HTTP POST");

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        // JSON-RPC errors may ride on non-2xx statuses; let the caller see the body.
        if !status.is_success() && !text.trim_start().starts_with('{') {
            return Err(Error::transport(format!("HTTP {status}: {text}")));
        }

        Ok(text)
    }
}
