//! Request dispatcher.
//!
//! Turns a typed [`RpcMethod`] into a JSON-RPC request, correlates the reply
//! by id and applies timeout, cancellation and retry policy.
//!
//! # Correlation
//!
//! Every call registers a `PendingCall` under a fresh [`RequestId`] before
//! any bytes leave the process. Replies are matched by id only, so two
//! outstanding calls may resolve in any order. A call that times out or is
//! cancelled removes its own entry; a reply arriving afterwards finds nothing
//! and is discarded, unless the call carried a resolve hook and its request
//! already went out: the hook is kept for a while so a late acknowledgement
//! can still be acted on (a late subscribe ack is unsubscribed).
//!
//! # Retries
//!
//! Only idempotent reads are retried, with the same jittered backoff as
//! WebSocket reconnects. State-changing calls are attempted exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, RequestIdGenerator};
use crate::metrics::Metrics;
use crate::protocol::{Route, RpcMethod, RpcRequest, RpcResponse, parse_responses};
use crate::transport::{Backoff, ConnectionManager};

// ============================================================================
// Constants
// ============================================================================

/// Default per-call timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default attempts for idempotent reads.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default bound on outstanding calls.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 1024;

/// How long the hook of an abandoned call waits for a late reply.
const LATE_REPLY_WINDOW: Duration = Duration::from_secs(60);

// ============================================================================
// Types
// ============================================================================

/// Runs on the resolving task with the call's result, before the caller wakes.
pub(crate) type ResolveHook = Box<dyn FnOnce(&Value) + Send>;

/// An outstanding call.
struct PendingCall {
    created_at: Instant,
    route: Route,
    method: &'static str,
    slot: oneshot::Sender<Result<Value>>,
    on_resolve: Option<ResolveHook>,
}

type PendingMap = FxHashMap<RequestId, PendingCall>;

/// Hook of a call whose caller gave up after the request was sent.
struct LateHook {
    abandoned_at: Instant,
    route: Route,
    hook: ResolveHook,
}

/// Dispatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Per-attempt timeout when the caller gives none.
    pub request_timeout: Duration,
    /// Attempts for idempotent reads (at least one).
    pub max_retries: u32,
    /// Delay between retry attempts.
    pub backoff: Backoff,
    /// Outstanding calls allowed before new ones are rejected.
    pub max_pending: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            max_pending: DEFAULT_MAX_PENDING_REQUESTS,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Correlates JSON-RPC calls with their replies.
///
/// Thread-safe; share behind an `Arc`.
pub struct Dispatcher {
    ids: RequestIdGenerator,
    pending: Mutex<PendingMap>,
    late: Mutex<FxHashMap<RequestId, LateHook>>,
    connection: Arc<ConnectionManager>,
    metrics: Arc<Metrics>,
    settings: DispatchSettings,
}

/// Deregisters a call when its future completes or is dropped.
struct PendingGuard<'a> {
    dispatcher: &'a Dispatcher,
    id: RequestId,
    /// The request reached the socket, so a reply may still come.
    sent: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let Some(call) = self.dispatcher.pending.lock().remove(&self.id) else {
            return;
        };
        trace!(id = %self.id, "Deregistered pending call");

        if let (true, Some(hook)) = (self.sent, call.on_resolve) {
            self.dispatcher.keep_late_hook(self.id, call.route, hook);
        }
    }
}

impl Dispatcher {
    /// Creates a dispatcher over `connection`.
    #[must_use]
    pub fn new(
        connection: Arc<ConnectionManager>,
        metrics: Arc<Metrics>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            ids: RequestIdGenerator::new(),
            pending: Mutex::new(PendingMap::default()),
            late: Mutex::new(FxHashMap::default()),
            connection,
            metrics,
            settings,
        }
    }

    /// Returns the dispatch policy.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Returns the connection manager.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Calls `method` with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Rpc`] if the node rejected the call
    /// - [`Error::RequestTimeout`] if no reply arrived in time
    /// - [`Error::ConnectionLost`] if the socket dropped while waiting
    /// - [`Error::TooManyPending`] if the pending table is full
    pub async fn call(&self, method: RpcMethod) -> Result<Value> {
        self.call_with_timeout(method, self.settings.request_timeout)
            .await
    }

    /// Calls `method` with a per-attempt timeout.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_with_timeout(&self, method: RpcMethod, timeout: Duration) -> Result<Value> {
        self.call_with_cancel(method, timeout, &CancellationToken::new())
            .await
    }

    /// Calls `method`, returning [`Error::Cancelled`] promptly if `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_with_cancel(
        &self,
        method: RpcMethod,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.call_hooked(method, timeout, cancel, None).await
    }

    /// Calls `method`; `hook` runs with the result on the resolving task.
    ///
    /// Calls carrying a hook are never retried.
    pub(crate) async fn call_hooked(
        &self,
        method: RpcMethod,
        timeout: Duration,
        cancel: &CancellationToken,
        mut hook: Option<ResolveHook>,
    ) -> Result<Value> {
        let retryable = method.is_idempotent() && hook.is_none();
        let attempts = if retryable {
            self.settings.max_retries.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            match self.call_once(&method, timeout, cancel, hook.take()).await {
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.settings.backoff.delay(attempt);
                    debug!(
                        method = method.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying idempotent call"
                    );
                    self.metrics.retry();

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = sleep(delay) => {}
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn call_once(
        &self,
        method: &RpcMethod,
        call_timeout: Duration,
        cancel: &CancellationToken,
        hook: Option<ResolveHook>,
    ) -> Result<Value> {
        let id = self.ids.next_id();
        let request = RpcRequest::new(id, method);
        let body = request.to_json()?;
        let route = method.route();

        let (slot, response_rx) = oneshot::channel();

        // Register before sending so a fast reply always finds its entry
        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.settings.max_pending {
                warn!(
                    pending = pending.len(),
                    max = self.settings.max_pending,
                    "Too many pending requests"
                );
                return Err(Error::TooManyPending {
                    pending: pending.len(),
                    max: self.settings.max_pending,
                });
            }
            pending.insert(
                id,
                PendingCall {
                    created_at: Instant::now(),
                    route,
                    method: request.method,
                    slot,
                    on_resolve: hook,
                },
            );
        }
        let mut guard = PendingGuard {
            dispatcher: self,
            id,
            sent: false,
        };

        self.metrics.request_sent();
        let started = Instant::now();
        trace!(id = %id, method = request.method, ?route, "Dispatching request");

        let exchange = async {
            match route {
                Route::Http => {
                    let reply = self.connection.send_http(body).await?;
                    self.resolve_http(id, &reply)?;
                }
                Route::WebSocket => {
                    self.connection.ws_send(body).await?;
                    guard.sent = true;
                }
            }
            response_rx.await.map_err(|_| Error::ConnectionLost)?
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(id = %id, method = request.method, "Call cancelled");
                Err(Error::Cancelled)
            }
            outcome = timeout(call_timeout, exchange) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    self.metrics.timeout();
                    debug!(id = %id, method = request.method, "Call timed out");
                    Err(Error::request_timeout(id, call_timeout.as_millis() as u64))
                }
            },
        };

        let latency = started.elapsed();
        match &result {
            Ok(_) => self.metrics.request_succeeded(latency),
            Err(e) => {
                if matches!(e, Error::Rpc { .. }) {
                    self.metrics.rpc_error();
                }
                self.metrics.request_failed(latency);
            }
        }

        result
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves the pending call matching `response.id`.
    ///
    /// Replies with no matching entry (late, cancelled, unknown) are dropped.
    pub fn handle_response(&self, response: RpcResponse) {
        let Some(id) = response.id else {
            warn!("Discarding response without id");
            return;
        };
        self.resolve(id, response.into_result());
    }

    fn resolve(&self, id: RequestId, result: Result<Value>) {
        let Some(call) = self.pending.lock().remove(&id) else {
            self.resolve_late(id, result);
            return;
        };

        trace!(
            id = %id,
            method = call.method,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            "Resolved pending call"
        );

        if let (Ok(value), Some(hook)) = (&result, call.on_resolve) {
            hook(value);
        }
        let _ = call.slot.send(result);
    }

    /// Runs the kept hook of an abandoned call, if the reply succeeded.
    fn resolve_late(&self, id: RequestId, result: Result<Value>) {
        let Some(late) = self.late.lock().remove(&id) else {
            debug!(id = %id, "Discarding response for unknown or expired call");
            return;
        };

        debug!(
            id = %id,
            abandoned_ms = late.abandoned_at.elapsed().as_millis() as u64,
            "Late reply for abandoned call"
        );
        if let Ok(value) = &result {
            (late.hook)(value);
        }
    }

    fn keep_late_hook(&self, id: RequestId, route: Route, hook: ResolveHook) {
        let mut late = self.late.lock();
        late.retain(|_, kept| kept.abandoned_at.elapsed() < LATE_REPLY_WINDOW);
        late.insert(
            id,
            LateHook {
                abandoned_at: Instant::now(),
                route,
                hook,
            },
        );
    }

    /// Number of abandoned calls still waiting for a late reply.
    #[cfg(test)]
    pub(crate) fn late_count(&self) -> usize {
        self.late.lock().len()
    }

    /// Resolves from an HTTP body, which answers exactly one request.
    fn resolve_http(&self, id: RequestId, body: &str) -> Result<()> {
        for response in parse_responses(body)? {
            // A parse error reply carries a null id but still answers us
            let response_id = response.id.unwrap_or(id);
            self.resolve(response_id, response.into_result());
        }
        if self.pending.lock().contains_key(&id) {
            return Err(Error::protocol(format!("no response for request {id}")));
        }
        Ok(())
    }

    /// Fails every outstanding call on `route` with `error()`.
    ///
    /// Used when the socket drops; HTTP calls are unaffected.
    pub fn fail_route(&self, route: Route, error: impl Fn() -> Error) -> usize {
        let failed: Vec<PendingCall> = {
            let mut pending = self.pending.lock();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, call)| call.route == route)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        // A reply can no longer arrive on a dead route.
        self.late.lock().retain(|_, kept| kept.route != route);

        let count = failed.len();
        for call in failed {
            let _ = call.slot.send(Err(error()));
        }
        if count > 0 {
            debug!(count, ?route, "Failed outstanding calls");
        }
        count
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::join_all;
    use serde_json::json;
    use url::Url;

    use crate::identifiers::Address;
    use crate::protocol::{Commitment, InboundFrame, SubscriptionTarget};
    use crate::transport::mock::{MockHttp, MockPeer};
    use crate::transport::{ConnectionEvent, ConnectionObserver, ReconnectPolicy};

    fn settings() -> DispatchSettings {
        DispatchSettings {
            request_timeout: Duration::from_secs(2),
            max_retries: 3,
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
            max_pending: 8,
        }
    }

    fn dispatcher(http: Arc<MockHttp>, ws_url: &str) -> Arc<Dispatcher> {
        let connection = ConnectionManager::new(
            Url::parse("http://127.0.0.1:8899").unwrap(),
            Url::parse(ws_url).unwrap(),
            http,
            ReconnectPolicy {
                backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
                max_attempts: 1,
                connect_timeout: Duration::from_secs(2),
            },
            Arc::new(Metrics::new()),
        );
        Arc::new(Dispatcher::new(
            Arc::new(connection),
            Arc::new(Metrics::new()),
            settings(),
        ))
    }

    /// Routes socket frames into the dispatcher.
    struct Forward(Arc<Dispatcher>);

    impl ConnectionObserver for Forward {
        fn on_frame(&self, text: &str) {
            if let Ok(InboundFrame::Response(response)) = InboundFrame::parse(text) {
                self.0.handle_response(response);
            }
        }

        fn on_event(&self, event: ConnectionEvent) {
            if event == ConnectionEvent::Dropped {
                self.0.fail_route(Route::WebSocket, || Error::ConnectionLost);
            }
        }
    }

    fn balance(address: Address) -> RpcMethod {
        RpcMethod::GetBalance {
            address,
            commitment: Commitment::Confirmed,
        }
    }

    #[tokio::test]
    async fn test_http_call_returns_result() {
        let http = Arc::new(MockHttp::new(|_| Ok(json!({"context": {"slot": 1}, "value": 42}))));
        let dispatcher = dispatcher(Arc::clone(&http), "ws://127.0.0.1:1");

        let value = dispatcher.call(balance(Address::new([1; 32]))).await.unwrap();

        assert_eq!(value["value"], 42);
        assert_eq!(http.calls(), 1);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_rpc_error_is_mirrored() {
        let http = Arc::new(MockHttp::new(|_| Err(Error::rpc(-32002, "insufficient funds"))));
        let dispatcher = dispatcher(Arc::clone(&http), "ws://127.0.0.1:1");

        let err = dispatcher
            .call(RpcMethod::RequestAirdrop {
                address: Address::new([1; 32]),
                lamports: 1,
                commitment: Commitment::Confirmed,
            })
            .await
            .unwrap_err();

        match err {
            Error::Rpc { code, message } => {
                assert_eq!(code, -32002);
                assert_eq!(message, "insufficient funds");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // RPC errors are not transport failures: no retry
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_answered_in_reverse_order() {
        // Earlier ids sleep longer, so replies land in reverse order
        let http = Arc::new(
            MockHttp::new(|request| {
                let address = request.params[0].as_str().unwrap().to_string();
                Ok(json!({"context": {"slot": 1}, "value": address.len()}))
            })
            .with_delay(|request| {
                let id = request.id.as_u64().unwrap();
                Duration::from_millis(150 - 40 * id.min(3))
            }),
        );
        let dispatcher = dispatcher(Arc::clone(&http), "ws://127.0.0.1:1");

        let addresses = [Address::new([1; 32]), Address::new([2; 32]), Address::new([9; 32])];
        let calls = addresses.iter().map(|a| {
            let dispatcher = Arc::clone(&dispatcher);
            let method = balance(*a);
            async move { dispatcher.call(method).await }
        });

        let results = join_all(calls).await;
        for (address, result) in addresses.iter().zip(results) {
            let value = result.unwrap();
            assert_eq!(value["value"], address.to_string().len());
        }
        assert_eq!(http.calls(), 3);
    }

    #[tokio::test]
    async fn test_idempotent_read_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let http = Arc::new(MockHttp::new(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::transport("connection reset"))
            } else {
                Ok(json!(77))
            }
        }));
        let dispatcher = dispatcher(Arc::clone(&http), "ws://127.0.0.1:1");

        let value = dispatcher
            .call(RpcMethod::GetSlot {
                commitment: Commitment::Confirmed,
            })
            .await
            .unwrap();

        assert_eq!(value, json!(77));
        assert_eq!(http.calls(), 3);
        assert_eq!(dispatcher.metrics.snapshot().retries, 2);
    }

    #[tokio::test]
    async fn test_retries_stop_at_limit() {
        let http = Arc::new(MockHttp::unreachable());
        let dispatcher = dispatcher(Arc::clone(&http), "ws://127.0.0.1:1");

        let err = dispatcher.call(balance(Address::new([1; 32]))).await.unwrap_err();

        assert!(err.is_connection_error());
        assert_eq!(http.calls(), 3);
    }

    #[tokio::test]
    async fn test_state_changing_call_is_not_retried() {
        let http = Arc::new(MockHttp::unreachable());
        let dispatcher = dispatcher(Arc::clone(&http), "ws://127.0.0.1:1");

        let result = dispatcher
            .call(RpcMethod::SendTransaction {
                transaction: "AQ==".to_string(),
                skip_preflight: false,
                preflight_commitment: Commitment::Confirmed,
            })
            .await;

        assert!(result.is_err());
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_deregisters_call() {
        let http = Arc::new(
            MockHttp::new(|_| Ok(json!("ok"))).with_delay(|_| Duration::from_millis(300)),
        );
        let dispatcher = dispatcher(Arc::clone(&http), "ws://127.0.0.1:1");

        let err = dispatcher
            .call_with_timeout(RpcMethod::GetHealth, Duration::from_millis(30))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(dispatcher.pending_count(), 0);
        assert!(dispatcher.metrics.snapshot().timeouts >= 1);
    }

    #[tokio::test]
    async fn test_cancel_returns_promptly() {
        let http = Arc::new(
            MockHttp::new(|_| Ok(json!("ok"))).with_delay(|_| Duration::from_secs(5)),
        );
        let dispatcher = dispatcher(Arc::clone(&http), "ws://127.0.0.1:1");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = dispatcher
            .call_with_cancel(RpcMethod::GetHealth, Duration::from_secs(10), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_late_response_is_discarded() {
        let dispatcher = dispatcher(Arc::new(MockHttp::unreachable()), "ws://127.0.0.1:1");
        let response: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 999, "result": 1})).unwrap();

        dispatcher.handle_response(response);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_too_many_pending() {
        let http = Arc::new(
            MockHttp::new(|_| Ok(json!("ok"))).with_delay(|_| Duration::from_millis(300)),
        );
        let dispatcher = dispatcher(http, "ws://127.0.0.1:1");

        let calls = (0..9).map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.call(RpcMethod::GetHealth).await }
        });
        let results = join_all(calls).await;

        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(Error::TooManyPending { .. })))
            .count();
        assert_eq!(rejected, 1);
    }

    #[tokio::test]
    async fn test_websocket_replies_routed_out_of_order() {
        let peer = MockPeer::bind().await;
        let dispatcher = dispatcher(Arc::new(MockHttp::unreachable()), &peer.ws_url());
        let observer: Arc<dyn ConnectionObserver> = Arc::new(Forward(Arc::clone(&dispatcher)));
        dispatcher.connection().set_observer(Arc::downgrade(&observer));

        let subscribe = |seed: u8| RpcMethod::Subscribe {
            target: SubscriptionTarget::Account(Address::new([seed; 32])),
            commitment: Commitment::Confirmed,
        };

        let first = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.call(subscribe(1)).await }
        });
        let mut conn = peer.accept().await;
        let request_a = conn.recv_json().await;

        let second = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.call(subscribe(2)).await }
        });
        let request_b = conn.recv_json().await;

        // Reply to the later request first
        conn.respond(&request_b["id"], json!(200)).await;
        conn.respond(&request_a["id"], json!(100)).await;

        assert_eq!(first.await.unwrap().unwrap(), json!(100));
        assert_eq!(second.await.unwrap().unwrap(), json!(200));
    }

    #[tokio::test]
    async fn test_socket_drop_fails_websocket_calls() {
        let peer = MockPeer::bind().await;
        let dispatcher = dispatcher(Arc::new(MockHttp::unreachable()), &peer.ws_url());
        let observer: Arc<dyn ConnectionObserver> = Arc::new(Forward(Arc::clone(&dispatcher)));
        dispatcher.connection().set_observer(Arc::downgrade(&observer));

        let call = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                dispatcher
                    .call(RpcMethod::Subscribe {
                        target: SubscriptionTarget::Account(Address::new([3; 32])),
                        commitment: Commitment::Confirmed,
                    })
                    .await
            }
        });

        let mut conn = peer.accept().await;
        let _request = conn.recv_json().await;
        conn.close().await;

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_late_reply_runs_hook_of_abandoned_call() {
        let peer = MockPeer::bind().await;
        let dispatcher = dispatcher(Arc::new(MockHttp::unreachable()), &peer.ws_url());
        let observer: Arc<dyn ConnectionObserver> = Arc::new(Forward(Arc::clone(&dispatcher)));
        dispatcher.connection().set_observer(Arc::downgrade(&observer));

        let (acked_tx, acked_rx) = oneshot::channel();
        let hook: ResolveHook = Box::new(move |value: &Value| {
            let _ = acked_tx.send(value.clone());
        });

        let call = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                dispatcher
                    .call_hooked(
                        RpcMethod::Subscribe {
                            target: SubscriptionTarget::Account(Address::new([6; 32])),
                            commitment: Commitment::Confirmed,
                        },
                        Duration::from_millis(50),
                        &CancellationToken::new(),
                        Some(hook),
                    )
                    .await
            }
        });

        let mut conn = peer.accept().await;
        let request = conn.recv_json().await;

        let err = call.await.unwrap().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(dispatcher.late_count(), 1);

        conn.respond(&request["id"], json!(77)).await;
        let acked = tokio::time::timeout(Duration::from_secs(2), acked_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acked, json!(77));
        assert_eq!(dispatcher.late_count(), 0);
    }

    #[tokio::test]
    async fn test_socket_drop_forgets_abandoned_hooks() {
        let peer = MockPeer::bind().await;
        let dispatcher = dispatcher(Arc::new(MockHttp::unreachable()), &peer.ws_url());
        let observer: Arc<dyn ConnectionObserver> = Arc::new(Forward(Arc::clone(&dispatcher)));
        dispatcher.connection().set_observer(Arc::downgrade(&observer));

        let call = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                dispatcher
                    .call_hooked(
                        RpcMethod::Subscribe {
                            target: SubscriptionTarget::Account(Address::new([7; 32])),
                            commitment: Commitment::Confirmed,
                        },
                        Duration::from_millis(50),
                        &CancellationToken::new(),
                        Some(Box::new(|_: &Value| {})),
                    )
                    .await
            }
        });

        let mut conn = peer.accept().await;
        let _request = conn.recv_json().await;
        assert!(call.await.unwrap().unwrap_err().is_timeout());
        assert_eq!(dispatcher.late_count(), 1);

        conn.close().await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while dispatcher.late_count() > 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
