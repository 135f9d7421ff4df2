//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use solana_rpc_core::{Client, Cluster};
//!
//! # fn example() -> solana_rpc_core::Result<()> {
//! let client = Client::builder()
//!     .cluster(Cluster::Devnet)
//!     .request_timeout(Duration::from_secs(10))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::Commitment;
use crate::transport::{Backoff, HttpTransport, ReqwestTransport};

use super::config::{ClientConfig, Cluster, Endpoint};
use super::core::Client;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ClientBuilder {
    /// JSON-RPC URL.
    http_url: Option<String>,
    /// PubSub URL; derived from `http_url` when unset.
    ws_url: Option<String>,
    /// Well-known cluster, used when no URL is set.
    cluster: Option<Cluster>,

    request_timeout: Option<Duration>,
    commitment: Option<Commitment>,
    max_retries: Option<u32>,
    backoff: Option<Backoff>,
    max_reconnect_attempts: Option<u32>,
    connect_timeout: Option<Duration>,
    listener_capacity: Option<usize>,
    max_pending_requests: Option<usize>,
    resubscribe_on_reconnect: Option<bool>,
    poll_interval: Option<Duration>,
    confirm_timeout: Option<Duration>,
    max_tracked_transactions: Option<usize>,

    /// HTTP implementation; reqwest when unset.
    http_transport: Option<Arc<dyn HttpTransport>>,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the JSON-RPC URL.
    ///
    /// # Arguments
    ///
    /// * `url` - `http://` or `https://` endpoint
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.http_url = Some(url.into());
        self
    }

    /// Sets the PubSub URL explicitly.
    #[inline]
    #[must_use]
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Targets a well-known cluster.
    #[inline]
    #[must_use]
    pub fn cluster(mut self, cluster: Cluster) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Sets the per-call timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the default commitment.
    #[inline]
    #[must_use]
    pub fn commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = Some(commitment);
        self
    }

    /// Sets the attempt count for idempotent reads.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = Some(attempts);
        self
    }

    /// Sets retry and reconnect backoff bounds.
    #[inline]
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Sets the reconnect attempts before giving up.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Sets the deadline for each WebSocket handshake.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the per-listener notification queue bound.
    #[inline]
    #[must_use]
    pub fn listener_capacity(mut self, capacity: usize) -> Self {
        self.listener_capacity = Some(capacity);
        self
    }

    /// Sets the outstanding call limit.
    #[inline]
    #[must_use]
    pub fn max_pending_requests(mut self, limit: usize) -> Self {
        self.max_pending_requests = Some(limit);
        self
    }

    /// Re-establishes subscriptions after a reconnect instead of closing them.
    #[inline]
    #[must_use]
    pub fn resubscribe_on_reconnect(mut self, enabled: bool) -> Self {
        self.resubscribe_on_reconnect = Some(enabled);
        self
    }

    /// Sets the status poll cadence while confirming.
    #[inline]
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the default confirmation deadline.
    #[inline]
    #[must_use]
    pub fn confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = Some(timeout);
        self
    }

    /// Sets how many tracked transactions are kept before finished ones are evicted.
    #[inline]
    #[must_use]
    pub fn max_tracked_transactions(mut self, limit: usize) -> Self {
        self.max_tracked_transactions = Some(limit);
        self
    }

    /// Replaces the HTTP implementation.
    #[inline]
    #[must_use]
    pub fn http_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.http_transport = Some(transport);
        self
    }

    /// Builds the client with validation.
    ///
    /// Must be called inside a Tokio runtime. No network traffic happens
    /// until the first operation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set or a value is out of range
    /// - [`Error::Http`] if the default HTTP client cannot be created
    pub fn build(self) -> Result<Client> {
        let transport = match self.http_transport.clone() {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let config = self.build_config()?;

        Ok(Client::new(config, transport))
    }

    /// Resolves and validates the configuration without creating a client.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(self.resolve_endpoint()?);

        if let Some(v) = self.request_timeout {
            config.request_timeout = v;
        }
        if let Some(v) = self.commitment {
            config.commitment = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.backoff {
            config.backoff = v;
        }
        if let Some(v) = self.max_reconnect_attempts {
            config.max_reconnect_attempts = v;
        }
        if let Some(v) = self.connect_timeout {
            config.connect_timeout = v;
        }
        if let Some(v) = self.listener_capacity {
            config.listener_capacity = v;
        }
        if let Some(v) = self.max_pending_requests {
            config.max_pending_requests = v;
        }
        if let Some(v) = self.resubscribe_on_reconnect {
            config.resubscribe_on_reconnect = v;
        }
        if let Some(v) = self.poll_interval {
            config.poll_interval = v;
        }
        if let Some(v) = self.confirm_timeout {
            config.confirm_timeout = v;
        }
        if let Some(v) = self.max_tracked_transactions {
            config.max_tracked_transactions = v;
        }

        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Picks the endpoint: explicit URL wins over cluster.
    fn resolve_endpoint(&self) -> Result<Endpoint> {
        match (&self.http_url, &self.ws_url, self.cluster) {
            (Some(http), Some(ws), _) => Endpoint::new(http, ws),
            (Some(http), None, _) => Endpoint::from_http(http),
            (None, Some(_), _) => Err(Error::config(
                "WebSocket URL set without an HTTP URL. Use .url() as well.",
            )),
            (None, None, Some(cluster)) => Endpoint::cluster(cluster),
            (None, None, None) => Err(Error::config(
                "an endpoint is required. Use .url() or .cluster() to set it.\n\
                 Example: Client::builder().url(\"http://127.0.0.1:8899\")",
            )),
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("http_url", &self.http_url)
            .field("ws_url", &self.ws_url)
            .field("cluster", &self.cluster)
            .field("custom_transport", &self.http_transport.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_endpoint() {
        let err = ClientBuilder::new().build_config().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains(".url()"));
    }

    #[test]
    fn test_url_derives_ws() {
        let config = ClientBuilder::new()
            .url("http://127.0.0.1:8899")
            .build_config()
            .unwrap();
        assert_eq!(config.endpoint.ws_url().as_str(), "ws://127.0.0.1:8900/");
    }

    #[test]
    fn test_url_overrides_cluster() {
        let config = ClientBuilder::new()
            .cluster(Cluster::MainnetBeta)
            .url("http://localhost:9000")
            .ws_url("ws://localhost:9100")
            .build_config()
            .unwrap();
        assert_eq!(config.endpoint.http_url().port(), Some(9000));
        assert_eq!(config.endpoint.ws_url().port(), Some(9100));
    }

    #[test]
    fn test_ws_without_http() {
        let err = ClientBuilder::new()
            .ws_url("ws://localhost:8900")
            .build_config()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_overrides_apply() {
        let config = ClientBuilder::new()
            .cluster(Cluster::Devnet)
            .commitment(Commitment::Finalized)
            .max_retries(7)
            .listener_capacity(16)
            .resubscribe_on_reconnect(true)
            .confirm_timeout(Duration::from_secs(5))
            .max_tracked_transactions(64)
            .build_config()
            .unwrap();

        assert_eq!(config.commitment, Commitment::Finalized);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.listener_capacity, 16);
        assert!(config.resubscribe_on_reconnect);
        assert_eq!(config.confirm_timeout, Duration::from_secs(5));
        assert_eq!(config.tracker_settings().max_records, 64);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ClientBuilder::new()
            .cluster(Cluster::Localnet)
            .request_timeout(Duration::ZERO)
            .build_config()
            .unwrap_err();
        assert!(err.to_string().contains("request_timeout"));
    }
}
