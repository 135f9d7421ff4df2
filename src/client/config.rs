//! Client configuration.
//!
//! [`ClientConfig`] is immutable once built and is split into the per-component
//! settings each layer consumes.
//!
//! # Defaults
//!
//! | Setting | Default |
//! |---------|---------|
//! | `request_timeout` | 30s |
//! | `commitment` | `confirmed` |
//! | `max_retries` | 3 attempts (idempotent reads only) |
//! | `backoff` | base 500ms, cap 30s, full jitter |
//! | `max_reconnect_attempts` | 5 |
//! | `connect_timeout` | 10s |
//! | `listener_capacity` | 1024 |
//! | `max_pending_requests` | 1024 |
//! | `resubscribe_on_reconnect` | `false` |
//! | `poll_interval` | 400ms |
//! | `confirm_timeout` | 60s |
//! | `max_tracked_transactions` | 10 000 |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Commitment;
use crate::rpc::{
    DEFAULT_MAX_PENDING_REQUESTS, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT, DispatchSettings,
};
use crate::subscription::{DEFAULT_LISTENER_CAPACITY, SubscriptionSettings};
use crate::tracker::{
    DEFAULT_CONFIRM_TIMEOUT, DEFAULT_MAX_RECORDS, DEFAULT_POLL_INTERVAL, TrackerSettings,
};
use crate::transport::{Backoff, DEFAULT_CONNECT_TIMEOUT, ReconnectPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ============================================================================
// Cluster
// ============================================================================

/// Well-known public clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cluster {
    /// Development cluster with airdrops.
    Devnet,
    /// Validator testing cluster.
    Testnet,
    /// Production cluster.
    MainnetBeta,
    /// Local test validator.
    Localnet,
}

impl Cluster {
    /// JSON-RPC endpoint.
    #[must_use]
    pub const fn http_url(self) -> &'static str {
        match self {
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Self::Localnet => "http://127.0.0.1:8899",
        }
    }

    /// PubSub endpoint.
    #[must_use]
    pub const fn ws_url(self) -> &'static str {
        match self {
            Self::Devnet => "wss://api.devnet.solana.com",
            Self::Testnet => "wss://api.testnet.solana.com",
            Self::MainnetBeta => "wss://api.mainnet-beta.solana.com",
            Self::Localnet => "ws://127.0.0.1:8900",
        }
    }

    /// Cluster name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
            Self::MainnetBeta => "mainnet-beta",
            Self::Localnet => "localnet",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cluster {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" | "d" => Ok(Self::Devnet),
            "testnet" | "t" => Ok(Self::Testnet),
            "mainnet-beta" | "mainnet" | "m" => Ok(Self::MainnetBeta),
            "localnet" | "localhost" | "l" => Ok(Self::Localnet),
            other => Err(Error::config(format!("unknown cluster '{other}'"))),
        }
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// HTTP and WebSocket URLs of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    http_url: Url,
    ws_url: Url,
}

impl Endpoint {
    /// Parses both URLs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unparsable URLs or wrong schemes.
    pub fn new(http_url: &str, ws_url: &str) -> Result<Self> {
        let http_url = parse_url(http_url, &["http", "https"])?;
        let ws_url = parse_url(ws_url, &["ws", "wss"])?;
        Ok(Self { http_url, ws_url })
    }

    /// Parses the HTTP URL and derives the WebSocket URL from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unparsable URLs or wrong schemes.
    pub fn from_http(http_url: &str) -> Result<Self> {
        let http_url = parse_url(http_url, &["http", "https"])?;
        let ws_url = derive_ws_url(&http_url)?;
        Ok(Self { http_url, ws_url })
    }

    /// Endpoint of a well-known cluster.
    ///
    /// # Errors
    ///
    /// Infallible for the built-in URLs; kept fallible for uniformity.
    pub fn cluster(cluster: Cluster) -> Result<Self> {
        Self::new(cluster.http_url(), cluster.ws_url())
    }

    /// JSON-RPC URL.
    #[inline]
    #[must_use]
    pub fn http_url(&self) -> &Url {
        &self.http_url
    }

    /// PubSub URL.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }
}

fn parse_url(input: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(input).map_err(|e| Error::config(format!("invalid URL '{input}': {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(Error::config(format!(
            "URL '{input}' must use one of: {}",
            schemes.join(", ")
        )));
    }
    Ok(url)
}

/// `http→ws`, `https→wss`; an explicit port moves up by one.
///
/// # Errors
///
/// Returns [`Error::Config`] if the URL cannot be rewritten.
pub fn derive_ws_url(http_url: &Url) -> Result<Url> {
    let mut ws_url = http_url.clone();
    let scheme = match http_url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(Error::config(format!("cannot derive WebSocket URL from '{other}'"))),
    };
    ws_url
        .set_scheme(scheme)
        .map_err(|()| Error::config(format!("cannot rewrite scheme of '{http_url}'")))?;

    if let Some(port) = http_url.port() {
        let next = port
            .checked_add(1)
            .ok_or_else(|| Error::config(format!("port {port} has no successor")))?;
        ws_url
            .set_port(Some(next))
            .map_err(|()| Error::config(format!("cannot set port on '{http_url}'")))?;
    }

    Ok(ws_url)
}

// ============================================================================
// ClientConfig
// ============================================================================

/// Immutable client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Node URLs.
    pub endpoint: Endpoint,
    /// Per-call timeout.
    pub request_timeout: Duration,
    /// Commitment for reads, preflight and confirmation.
    pub commitment: Commitment,
    /// Attempts for idempotent reads.
    pub max_retries: u32,
    /// Retry and reconnect backoff.
    pub backoff: Backoff,
    /// Reconnect attempts before `ConnectionLost` is final.
    pub max_reconnect_attempts: u32,
    /// Deadline for each WebSocket handshake.
    pub connect_timeout: Duration,
    /// Per-listener notification queue bound.
    pub listener_capacity: usize,
    /// Outstanding calls allowed.
    pub max_pending_requests: usize,
    /// Re-establish subscriptions after a reconnect.
    pub resubscribe_on_reconnect: bool,
    /// Status poll cadence while confirming.
    pub poll_interval: Duration,
    /// Default confirmation deadline.
    pub confirm_timeout: Duration,
    /// Tracked transactions kept before finished ones are evicted.
    pub max_tracked_transactions: usize,
}

impl ClientConfig {
    /// Configuration with defaults for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            commitment: Commitment::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            listener_capacity: DEFAULT_LISTENER_CAPACITY,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            resubscribe_on_reconnect: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            max_tracked_transactions: DEFAULT_MAX_RECORDS,
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let zero_durations = [
            ("request_timeout", self.request_timeout),
            ("connect_timeout", self.connect_timeout),
            ("poll_interval", self.poll_interval),
            ("confirm_timeout", self.confirm_timeout),
        ];
        if let Some((name, _)) = zero_durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }
        if self.max_retries == 0 {
            return Err(Error::config("max_retries must be at least 1"));
        }
        if self.listener_capacity == 0 {
            return Err(Error::config("listener_capacity must be at least 1"));
        }
        if self.max_tracked_transactions == 0 {
            return Err(Error::config("max_tracked_transactions must be at least 1"));
        }
        if self.max_pending_requests == 0 {
            return Err(Error::config("max_pending_requests must be at least 1"));
        }
        if self.backoff.base > self.backoff.cap {
            return Err(Error::config("backoff base must not exceed its cap"));
        }
        Ok(())
    }

    pub(crate) fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            request_timeout: self.request_timeout,
            max_retries: self.max_retries,
            backoff: self.backoff,
            max_pending: self.max_pending_requests,
        }
    }

    pub(crate) fn subscription_settings(&self) -> SubscriptionSettings {
        SubscriptionSettings {
            listener_capacity: self.listener_capacity,
            resubscribe_on_reconnect: self.resubscribe_on_reconnect,
        }
    }

    pub(crate) fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            poll_interval: self.poll_interval,
            confirm_timeout: self.confirm_timeout,
            max_records: self.max_tracked_transactions,
        }
    }

    pub(crate) fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            backoff: self.backoff,
            max_attempts: self.max_reconnect_attempts,
            connect_timeout: self.connect_timeout,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
