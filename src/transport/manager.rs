//! Connection manager for the HTTP endpoint and the PubSub socket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              ConnectionManager               │
//! │                                              │
//! │  send_http ──► HttpTransport ──► http_url    │
//! │                                              │
//! │  ws_send ──► mpsc ──► event loop ──► ws_url  │
//! │                          │                   │
//! │                          ▼                   │
//! │              ConnectionObserver (frames,     │
//! │              lifecycle) + broadcast events   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The WebSocket is opened lazily by the first [`ws_send`](ConnectionManager::ws_send)
//! or an explicit [`connect`](ConnectionManager::connect).

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::metrics::Metrics;

use super::connection::{
    ConnectionEvent, ConnectionObserver, ReconnectPolicy, Shared, WsState, open, run_event_loop,
};
use super::http::HttpTransport;

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owns the HTTP transport and the single WebSocket.
pub struct ConnectionManager {
    /// One-shot call endpoint.
    http_url: Url,

    /// PubSub endpoint.
    ws_url: Url,

    /// HTTP implementation.
    http: Arc<dyn HttpTransport>,

    /// State shared with the event loop.
    shared: Arc<Shared>,

    /// Serializes connection attempts.
    connect_gate: AsyncMutex<()>,

    /// Reconnect bounds handed to the event loop.
    policy: ReconnectPolicy,
}

impl ConnectionManager {
    /// Creates a manager. No network activity happens until first use.
    #[must_use]
    pub fn new(
        http_url: Url,
        ws_url: Url,
        http: Arc<dyn HttpTransport>,
        policy: ReconnectPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            http_url,
            ws_url,
            http,
            shared: Arc::new(Shared::new(metrics)),
            connect_gate: AsyncMutex::new(()),
            policy,
        }
    }

    /// Returns the HTTP endpoint.
    #[inline]
    #[must_use]
    pub fn http_url(&self) -> &Url {
        &self.http_url
    }

    /// Returns the WebSocket endpoint.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }

    /// Returns `true` while the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.shared.state.lock(), WsState::Open(_))
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Registers the receiver of frames and lifecycle events.
    ///
    /// Held weakly so the observer may own this manager.
    pub fn set_observer(&self, observer: Weak<dyn ConnectionObserver>) {
        *self.shared.observer.lock() = Some(observer);
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    // ========================================================================
    // HTTP
    // ========================================================================

    /// Posts a serialized request body and returns the raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] or [`Error::Http`] on network failure.
    pub async fn send_http(&self, body: String) -> Result<String> {
        if self.is_shut_down() {
            return Err(Error::connection("client is shut down"));
        }
        self.http.post(&self.http_url, body).await
    }

    // ========================================================================
    // WebSocket
    // ========================================================================

    /// Opens the WebSocket if it is not already open.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the handshake fails or after shutdown
    /// - [`Error::ConnectionLost`] while a reconnect is in progress
    pub async fn connect(&self) -> Result<()> {
        let _gate = self.connect_gate.lock().await;

        if self.is_shut_down() {
            return Err(Error::connection("client is shut down"));
        }

        match *self.shared.state.lock() {
            WsState::Open(_) => return Ok(()),
            WsState::Reconnecting => return Err(Error::ConnectionLost),
            WsState::Idle => {}
        }

        let stream = open(&self.ws_url, self.policy.connect_timeout).await?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        *self.shared.state.lock() = WsState::Open(command_tx.clone());

        tokio::spawn(run_event_loop(
            stream,
            command_tx,
            command_rx,
            Arc::clone(&self.shared),
            self.ws_url.clone(),
            self.policy,
        ));

        info!(url = %self.ws_url, "WebSocket connected");
        self.shared.emit(ConnectionEvent::Connected);

        Ok(())
    }

    /// Queues a frame on the socket's single write path.
    ///
    /// Connects lazily when idle. Fails fast while reconnecting.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionLost`] while reconnecting or if the loop exited
    /// - Any error from [`connect`](Self::connect)
    pub async fn ws_send(&self, frame: String) -> Result<()> {
        if let Some(result) = self.try_queue(&frame) {
            return result;
        }

        self.connect().await?;

        self.try_queue(&frame).unwrap_or(Err(Error::ConnectionLost))
    }

    /// `None` means the socket is idle.
    fn try_queue(&self, frame: &str) -> Option<Result<()>> {
        match &*self.shared.state.lock() {
            WsState::Open(tx) => Some(
                tx.send(frame.to_string())
                    .map_err(|_| Error::ConnectionLost),
            ),
            WsState::Reconnecting => Some(Err(Error::ConnectionLost)),
            WsState::Idle => None,
        }
    }

    /// Closes the socket and refuses further traffic.
    ///
    /// Observers receive [`ConnectionEvent::Closed`] from the event loop.
    pub fn shutdown(&self) {
        if self.shared.shutdown.is_cancelled() {
            return;
        }
        debug!("Shutting down connection manager");
        self.shared.shutdown.cancel();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::transport::backoff::Backoff;
    use crate::transport::mock::{MockHttp, MockPeer};

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            backoff: Backoff::new(Duration::from_millis(5), Duration::from_millis(10)),
            max_attempts: 3,
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Bounds every wait so a stalled handshake fails the test instead of hanging it.
    async fn within<F: std::future::Future>(future: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(5), future)
            .await
            .expect("step should finish in time")
    }

    fn manager(ws_url: &str, http: Arc<MockHttp>) -> ConnectionManager {
        ConnectionManager::new(
            Url::parse("http://127.0.0.1:8899").unwrap(),
            Url::parse(ws_url).unwrap(),
            http,
            policy(),
            Arc::new(Metrics::new()),
        )
    }

    #[derive(Default)]
    struct Collector {
        frames: Mutex<Vec<String>>,
    }

    impl ConnectionObserver for Collector {
        fn on_frame(&self, text: &str) {
            self.frames.lock().push(text.to_string());
        }

        fn on_event(&self, _event: ConnectionEvent) {}
    }

    #[tokio::test]
    async fn test_send_http_uses_transport() {
        let http = Arc::new(MockHttp::new(|_| Ok(json!(7))));
        let manager = manager("ws://127.0.0.1:1", Arc::clone(&http));

        let body = r#"{"jsonrpc":"2.0","id":1,"method":"getSlot","params":[]}"#;
        let response = manager.send_http(body.to_string()).await.unwrap();

        assert!(response.contains("\"result\":7"));
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_ws_send_connects_lazily_and_routes_frames() {
        let peer = MockPeer::bind().await;
        let manager = manager(&peer.ws_url(), Arc::new(MockHttp::unreachable()));

        let collector = Arc::new(Collector::default());
        let observer: Arc<dyn ConnectionObserver> = collector.clone();
        manager.set_observer(Arc::downgrade(&observer));
        let mut events = manager.events();

        assert!(!manager.is_connected());
        let (sent, mut conn) = within(async {
            tokio::join!(manager.ws_send("{\"ping\":1}".to_string()), peer.accept())
        })
        .await;
        sent.unwrap();
        assert!(manager.is_connected());
        assert_eq!(within(events.recv()).await.unwrap(), ConnectionEvent::Connected);
        assert_eq!(conn.recv_json().await, json!({"ping": 1}));

        conn.send_json(&json!({"pong": 1})).await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while collector.frames.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(collector.frames.lock()[0], r#"{"pong":1}"#);
    }

    #[tokio::test]
    async fn test_drop_then_reconnect() {
        let peer = MockPeer::bind().await;
        let manager = manager(&peer.ws_url(), Arc::new(MockHttp::unreachable()));
        let mut events = manager.events();

        let (connected, conn) = within(async { tokio::join!(manager.connect(), peer.accept()) }).await;
        connected.unwrap();
        assert_eq!(within(events.recv()).await.unwrap(), ConnectionEvent::Connected);

        conn.close().await;
        assert_eq!(within(events.recv()).await.unwrap(), ConnectionEvent::Dropped);

        // The event loop task reconnects on its own; this task only accepts.
        let _second = peer.accept().await;
        assert!(matches!(
            within(events.recv()).await.unwrap(),
            ConnectionEvent::Reconnected { .. }
        ));
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_traffic() {
        let peer = MockPeer::bind().await;
        let manager = manager(&peer.ws_url(), Arc::new(MockHttp::unreachable()));
        let mut events = manager.events();

        let (connected, _conn) =
            within(async { tokio::join!(manager.connect(), peer.accept()) }).await;
        connected.unwrap();
        assert_eq!(within(events.recv()).await.unwrap(), ConnectionEvent::Connected);

        manager.shutdown();
        assert_eq!(within(events.recv()).await.unwrap(), ConnectionEvent::Closed);

        let err = within(manager.connect()).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(manager.send_http("{}".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let manager = manager(&format!("ws://127.0.0.1:{port}"), Arc::new(MockHttp::unreachable()));
        let err = within(manager.ws_send("{}".to_string())).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[tokio::test]
    async fn test_stalled_handshake_releases_connect_gate() {
        // Accepts TCP and never answers the upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_url = format!("ws://{}", listener.local_addr().unwrap());
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let manager = ConnectionManager::new(
            Url::parse("http://127.0.0.1:8899").unwrap(),
            Url::parse(&ws_url).unwrap(),
            Arc::new(MockHttp::unreachable()),
            ReconnectPolicy {
                connect_timeout: Duration::from_millis(100),
                ..policy()
            },
            Arc::new(Metrics::new()),
        );

        let first = within(manager.ws_send("{}".to_string())).await.unwrap_err();
        assert!(first.to_string().contains("timed out"));

        // The gate is free again, so a second caller gets its own bounded attempt.
        let second = within(manager.connect()).await.unwrap_err();
        assert!(matches!(second, Error::Connection { .. }));
        assert!(!manager.is_connected());
        silent.abort();
    }
}
