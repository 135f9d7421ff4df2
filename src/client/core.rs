//! Core Client struct, frame routing and accessors.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::protocol::types::decode_u64;
use crate::protocol::{Commitment, InboundFrame, Route, RpcMethod};
use crate::rpc::Dispatcher;
use crate::subscription::SubscriptionManager;
use crate::tracker::TransactionTracker;
use crate::transport::{ConnectionEvent, ConnectionManager, ConnectionObserver, HttpTransport};

use super::builder::ClientBuilder;
use super::config::ClientConfig;

// ============================================================================
// Router
// ============================================================================

/// Hands socket traffic to the component that owns it. Runs on the reader task.
struct Router {
    dispatcher: Arc<Dispatcher>,
    subscriptions: Arc<SubscriptionManager>,
}

impl ConnectionObserver for Router {
    fn on_frame(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Response(response)) => self.dispatcher.handle_response(response),
            Ok(InboundFrame::Notification(notification)) => {
                self.subscriptions.handle_notification(notification);
            }
            Err(e) => warn!(error = %e, len = text.len(), "Discarding unreadable frame"),
        }
    }

    fn on_event(&self, event: ConnectionEvent) {
        trace!(?event, "Routing connection event");

        // Calls in flight on the old socket can never be answered
        if !matches!(
            event,
            ConnectionEvent::Connected | ConnectionEvent::Reconnected { .. }
        ) {
            let failed = self
                .dispatcher
                .fail_route(Route::WebSocket, || Error::ConnectionLost);
            if failed > 0 {
                debug!(failed, ?event, "Failed in-flight socket calls");
            }
        }

        self.subscriptions.handle_connection_event(event);
    }
}

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a client.
pub(crate) struct ClientInner {
    /// Immutable configuration.
    pub config: ClientConfig,
    /// HTTP transport and the single socket.
    pub connection: Arc<ConnectionManager>,
    /// Request correlation.
    pub dispatcher: Arc<Dispatcher>,
    /// Push-notification streams.
    pub subscriptions: Arc<SubscriptionManager>,
    /// Transaction lifecycle records.
    pub tracker: Arc<TransactionTracker>,
    /// Shared counters.
    pub metrics: Arc<Metrics>,
    /// Keeps the weakly-held observer alive.
    _router: Arc<Router>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.connection.shutdown();
    }
}

// ============================================================================
// Client
// ============================================================================

/// A handle to one node.
///
/// Cheap to clone; clones share the connection, pending calls,
/// subscriptions and tracked transactions.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("http_url", &self.inner.config.endpoint.http_url().as_str())
            .field("ws_url", &self.inner.config.endpoint.ws_url().as_str())
            .field("connected", &self.inner.connection.is_connected())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Wires the components together. No network activity happens here.
    #[must_use]
    pub fn new(config: ClientConfig, http: Arc<dyn HttpTransport>) -> Self {
        let metrics = Arc::new(Metrics::new());

        let connection = Arc::new(ConnectionManager::new(
            config.endpoint.http_url().clone(),
            config.endpoint.ws_url().clone(),
            http,
            config.reconnect_policy(),
            Arc::clone(&metrics),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&connection),
            Arc::clone(&metrics),
            config.dispatch_settings(),
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&dispatcher),
            Arc::clone(&metrics),
            config.subscription_settings(),
        ));
        let tracker = Arc::new(TransactionTracker::new(
            Arc::clone(&dispatcher),
            Arc::clone(&subscriptions),
            Arc::clone(&metrics),
            config.tracker_settings(),
        ));

        let router = Arc::new(Router {
            dispatcher: Arc::clone(&dispatcher),
            subscriptions: Arc::clone(&subscriptions),
        });
        let observer: Arc<dyn ConnectionObserver> = router.clone();
        connection.set_observer(Arc::downgrade(&observer));

        debug!(
            http_url = %config.endpoint.http_url(),
            ws_url = %config.endpoint.ws_url(),
            "Client created"
        );

        Self {
            inner: Arc::new(ClientInner {
                config,
                connection,
                dispatcher,
                subscriptions,
                tracker,
                metrics,
                _router: router,
            }),
        }
    }
}

// ============================================================================
// Client - Accessors
// ============================================================================

impl Client {
    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the default commitment.
    #[inline]
    #[must_use]
    pub fn commitment(&self) -> Commitment {
        self.inner.config.commitment
    }

    /// Returns the request dispatcher.
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Returns the subscription manager.
    #[inline]
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    /// Returns the transaction tracker.
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &TransactionTracker {
        &self.inner.tracker
    }

    /// Returns `true` while the WebSocket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Subscribes to connection lifecycle events.
    #[must_use]
    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.connection.events()
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

// ============================================================================
// Client - Node
// ============================================================================

impl Client {
    /// Returns `true` if the node reports itself healthy.
    ///
    /// An unhealthy node answers with an RPC error, which is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] when the node is behind or unhealthy.
    pub async fn get_health(&self) -> Result<bool> {
        let result = self.call(RpcMethod::GetHealth).await?;
        Ok(result.as_str() == Some("ok"))
    }

    /// Current slot at the default commitment.
    ///
    /// # Errors
    ///
    /// Returns the call's error.
    pub async fn get_slot(&self) -> Result<u64> {
        let result = self
            .call(RpcMethod::GetSlot {
                commitment: self.commitment(),
            })
            .await?;
        decode_u64(result, "getSlot")
    }

    /// Closes the WebSocket and fails in-flight socket calls.
    ///
    /// Subsequent operations return [`Error::ConnectionLost`].
    pub fn shutdown(&self) {
        debug!("Client shutting down");
        self.inner.connection.shutdown();
        self.inner
            .dispatcher
            .fail_route(Route::WebSocket, || Error::ConnectionLost);
    }
}

// ============================================================================
// Client - Internal
// ============================================================================

impl Client {
    /// Dispatches `method` with the configured timeout.
    pub(crate) async fn call(&self, method: RpcMethod) -> Result<Value> {
        self.inner.dispatcher.call(method).await
    }
}

// ============================================================================
// Test Support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================
