//! Subscription manager.
//!
//! Issues `{kind}Subscribe` / `{kind}Unsubscribe` over the socket and
//! demultiplexes push notifications by subscription id.
//!
//! # Routing
//!
//! The peer-assigned id is installed in the routing table on the reader task,
//! before any later frame is read, so a notification that follows the
//! subscribe reply can never miss its listener. Each listener gets its own
//! bounded queue; a slow listener never stalls the reader.
//!
//! # Abandoned Subscribes
//!
//! Each subscribe carries a claim settled exactly once, under its lock, by
//! whichever side gets there first: the reply installs the route, or the
//! caller (cancelled, timed out, dropped, or unsubscribing during a
//! resubscribe) abandons it. An acknowledgement that finds its claim
//! abandoned is unsubscribed on the node instead of routed. Routes whose
//! [`Subscription`] handle was dropped are released the same way.
//!
//! # Connection Loss
//!
//! | Policy | On drop | On reconnect |
//! |--------|---------|--------------|
//! | default | table cleared, listeners get `ConnectionLost` | nothing |
//! | `resubscribe_on_reconnect` | entries parked | re-subscribed, listeners get `Resubscribed` |

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::metrics::Metrics;
use crate::protocol::{
    Commitment, Notification, NotificationPayload, RpcMethod, SignatureOutcome, SubscriptionKind,
    SubscriptionTarget,
};
use crate::rpc::Dispatcher;
use crate::rpc::dispatcher::ResolveHook;
use crate::transport::ConnectionEvent;

use super::handle::{Subscription, SubscriptionEvent, UnsubscribeOutcome};
use super::queue::ListenerQueue;

// ============================================================================
// Constants
// ============================================================================

/// Default per-listener queue capacity.
pub const DEFAULT_LISTENER_CAPACITY: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// A routed listener.
struct Entry {
    target: SubscriptionTarget,
    commitment: Commitment,
    id: Arc<AtomicU64>,
    queue: Arc<ListenerQueue>,
}

type Table = FxHashMap<SubscriptionId, Entry>;

/// Ownership of one subscribe reply.
enum Claim {
    /// No reply yet and the caller is still waiting.
    Waiting,
    /// The reply routed the listener under this id.
    Installed(SubscriptionId),
    /// The caller went away; a later acknowledgement is unsubscribed.
    Abandoned,
}

type SharedClaim = Arc<Mutex<Claim>>;

/// A resubscribe in flight after a reconnect.
struct Resubscribing {
    queue: Arc<ListenerQueue>,
    claim: SharedClaim,
}

/// Where `unsubscribe` found a listener.
enum Located {
    Routed(SubscriptionId, Entry),
    Parked,
    Resubscribing(SharedClaim),
    Missing,
}

/// Subscription policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionSettings {
    /// Per-listener queue bound.
    pub listener_capacity: usize,
    /// Re-establish subscriptions after a reconnect.
    pub resubscribe_on_reconnect: bool,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            listener_capacity: DEFAULT_LISTENER_CAPACITY,
            resubscribe_on_reconnect: false,
        }
    }
}

// ============================================================================
// SubscriptionManager
// ============================================================================

/// Owns the subscription table.
pub struct SubscriptionManager {
    dispatcher: Arc<Dispatcher>,
    table: Arc<Mutex<Table>>,
    /// Entries waiting for a reconnect, resubscribe policy only.
    parked: Mutex<Vec<Entry>>,
    /// Entries between a reconnect and their new acknowledgement.
    resubscribing: Mutex<Vec<Resubscribing>>,
    metrics: Arc<Metrics>,
    settings: SubscriptionSettings,
}

/// Abandons a subscribe whose caller stops waiting without a handle.
struct AbandonOnDrop<'a> {
    manager: &'a SubscriptionManager,
    claim: SharedClaim,
    queue: Arc<ListenerQueue>,
    armed: bool,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.clear_and_close();
            self.manager.abandon(&self.claim, &self.queue);
        }
    }
}

impl SubscriptionManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
        settings: SubscriptionSettings,
    ) -> Self {
        Self {
            dispatcher,
            table: Arc::new(Mutex::new(Table::default())),
            parked: Mutex::new(Vec::new()),
            resubscribing: Mutex::new(Vec::new()),
            metrics,
            settings,
        }
    }

    /// Number of routed subscriptions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Returns `true` if `id` is routed.
    #[must_use]
    pub fn is_active(&self, id: SubscriptionId) -> bool {
        self.table.lock().contains_key(&id)
    }

    // ========================================================================
    // Subscribe
    // ========================================================================

    /// Subscribes to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubscriptionFailed`] if the subscribe call fails.
    pub async fn subscribe(
        &self,
        target: SubscriptionTarget,
        commitment: Commitment,
    ) -> Result<Subscription> {
        self.subscribe_with_cancel(target, commitment, &CancellationToken::new())
            .await
    }

    /// Subscribes to `target`, returning [`Error::Cancelled`] if `cancel` fires.
    ///
    /// A subscribe abandoned before the node acknowledges it (cancelled,
    /// timed out or dropped) is unsubscribed when the acknowledgement arrives.
    ///
    /// # Errors
    ///
    /// See [`subscribe`](Self::subscribe).
    pub async fn subscribe_with_cancel(
        &self,
        target: SubscriptionTarget,
        commitment: Commitment,
        cancel: &CancellationToken,
    ) -> Result<Subscription> {
        self.release_detached();

        let kind = target.kind();
        let queue = Arc::new(ListenerQueue::new(
            self.settings.listener_capacity,
            Arc::clone(&self.metrics),
        ));
        let id = Arc::new(AtomicU64::new(0));
        let claim: SharedClaim = Arc::new(Mutex::new(Claim::Waiting));

        let hook = self.install_hook(
            Entry {
                target: target.clone(),
                commitment,
                id: Arc::clone(&id),
                queue: Arc::clone(&queue),
            },
            Arc::clone(&claim),
            None,
        );
        let mut pending = AbandonOnDrop {
            manager: self,
            claim,
            queue: Arc::clone(&queue),
            armed: true,
        };

        let method = RpcMethod::Subscribe {
            target: target.clone(),
            commitment,
        };
        let timeout = self.dispatcher.settings().request_timeout;

        match self
            .dispatcher
            .call_hooked(method, timeout, cancel, Some(hook))
            .await
        {
            Ok(value) => {
                let Some(raw) = value.as_u64() else {
                    return Err(Error::subscription_failed(
                        kind,
                        format!("invalid subscription id: {value}"),
                    ));
                };
                pending.armed = false;
                debug!(%kind, subscription = raw, %target, "Subscribed");
                Ok(Subscription { id, target, queue })
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(other) => Err(Error::subscription_failed(kind, other.to_string())),
        }
    }

    /// Builds the hook that settles `claim` with the id in the reply.
    ///
    /// `previous` is set for resubscribes and is announced to the listener.
    fn install_hook(
        &self,
        entry: Entry,
        claim: SharedClaim,
        previous: Option<SubscriptionId>,
    ) -> ResolveHook {
        let table = Arc::clone(&self.table);
        let metrics = Arc::clone(&self.metrics);
        let dispatcher = Arc::downgrade(&self.dispatcher);

        Box::new(move |value: &Value| {
            let Some(raw) = value.as_u64() else {
                return;
            };
            let current = SubscriptionId::new(raw);

            let mut state = claim.lock();
            if matches!(*state, Claim::Abandoned) || entry.queue.is_closed() {
                *state = Claim::Abandoned;
                drop(state);
                debug!(subscription = %current, "Acknowledged after its listener went away");
                spawn_unsubscribe(&dispatcher, entry.target.kind(), current);
                return;
            }

            entry.id.store(raw, Ordering::Release);
            let queue = Arc::clone(&entry.queue);
            table.lock().insert(current, entry);
            *state = Claim::Installed(current);
            drop(state);

            metrics.subscription_opened();
            if let Some(previous) = previous {
                queue.push(SubscriptionEvent::Resubscribed { previous, current });
            }
        })
    }

    /// Marks `claim` abandoned, unrouting and unsubscribing if it was installed.
    fn abandon(&self, claim: &Mutex<Claim>, queue: &Arc<ListenerQueue>) {
        let installed = {
            let mut state = claim.lock();
            match std::mem::replace(&mut *state, Claim::Abandoned) {
                Claim::Installed(id) => {
                    let mut table = self.table.lock();
                    match table.get(&id) {
                        Some(entry) if Arc::ptr_eq(&entry.queue, queue) => {
                            table.remove(&id).map(|entry| (id, entry))
                        }
                        _ => None,
                    }
                }
                Claim::Waiting | Claim::Abandoned => None,
            }
        };

        if let Some((id, entry)) = installed {
            self.metrics.subscriptions_closed(1);
            debug!(subscription = %id, "Discarding subscription abandoned by caller");
            spawn_unsubscribe(
                &Arc::downgrade(&self.dispatcher),
                entry.target.kind(),
                id,
            );
        }
    }

    /// Unroutes listeners whose handle was dropped and unsubscribes them.
    fn release_detached(&self) {
        let detached: Vec<(SubscriptionId, Entry)> = {
            let mut table = self.table.lock();
            let ids: Vec<SubscriptionId> = table
                .iter()
                .filter(|(_, entry)| entry.queue.is_closed())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| table.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        if detached.is_empty() {
            return;
        }

        self.metrics.subscriptions_closed(detached.len());
        debug!(count = detached.len(), "Releasing subscriptions whose handles were dropped");
        let dispatcher = Arc::downgrade(&self.dispatcher);
        for (id, entry) in detached {
            spawn_unsubscribe(&dispatcher, entry.target.kind(), id);
        }
    }

    // ========================================================================
    // Unsubscribe
    // ========================================================================

    /// Tears down the listener, then sends `{kind}Unsubscribe`.
    ///
    /// The listener is removed before the network call, so no event is
    /// delivered after this returns even if the call fails.
    ///
    /// # Errors
    ///
    /// Returns the unsubscribe call's error. The local record is gone either way.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<UnsubscribeOutcome> {
        self.unsubscribe_with_cancel(subscription, &CancellationToken::new())
            .await
    }

    /// Like [`unsubscribe`](Self::unsubscribe), honoring `cancel` for the network call.
    ///
    /// # Errors
    ///
    /// See [`unsubscribe`](Self::unsubscribe).
    pub async fn unsubscribe_with_cancel(
        &self,
        subscription: &Subscription,
        cancel: &CancellationToken,
    ) -> Result<UnsubscribeOutcome> {
        let queue = &subscription.queue;

        let (id, entry) = match self.locate(queue) {
            Located::Routed(id, entry) => (id, entry),
            Located::Parked => {
                // Parked entries have no live id on the node
                queue.clear_and_close();
                return Ok(UnsubscribeOutcome::Unsubscribed);
            }
            Located::Resubscribing(claim) => {
                queue.clear_and_close();
                self.abandon(&claim, queue);
                debug!(subscription = %subscription.id(), "Unsubscribed during resubscribe");
                return Ok(UnsubscribeOutcome::Unsubscribed);
            }
            Located::Missing => {
                queue.clear_and_close();
                debug!(subscription = %subscription.id(), "Not subscribed");
                return Ok(UnsubscribeOutcome::NotSubscribed);
            }
        };

        entry.queue.clear_and_close();
        self.metrics.subscriptions_closed(1);

        let kind = entry.target.kind();
        let method = RpcMethod::Unsubscribe {
            kind,
            subscription: id,
        };
        let timeout = self.dispatcher.settings().request_timeout;

        match self.dispatcher.call_with_cancel(method, timeout, cancel).await {
            Ok(Value::Bool(false)) => {
                warn!(%kind, subscription = %id, "Node reported unknown subscription");
                Ok(UnsubscribeOutcome::Unsubscribed)
            }
            Ok(_) => {
                debug!(%kind, subscription = %id, "Unsubscribed");
                Ok(UnsubscribeOutcome::Unsubscribed)
            }
            Err(e) => {
                warn!(%kind, subscription = %id, error = %e, "Unsubscribe call failed");
                Err(e)
            }
        }
    }

    /// Detaches the listener owning `queue` from wherever it is held.
    ///
    /// The resubscribe list is locked first, so a resubscribe cannot finish
    /// between the table lookup and the list lookup.
    fn locate(&self, queue: &Arc<ListenerQueue>) -> Located {
        let mut resubscribing = self.resubscribing.lock();

        let routed = {
            let mut table = self.table.lock();
            let id = table
                .iter()
                .find(|(_, entry)| Arc::ptr_eq(&entry.queue, queue))
                .map(|(id, _)| *id);
            id.and_then(|id| table.remove(&id).map(|entry| (id, entry)))
        };
        if let Some((id, entry)) = routed {
            return Located::Routed(id, entry);
        }

        {
            let mut parked = self.parked.lock();
            if let Some(index) = parked.iter().position(|entry| Arc::ptr_eq(&entry.queue, queue)) {
                parked.swap_remove(index);
                return Located::Parked;
            }
        }

        match resubscribing
            .iter()
            .position(|pending| Arc::ptr_eq(&pending.queue, queue))
        {
            Some(index) => Located::Resubscribing(resubscribing.swap_remove(index).claim),
            None => Located::Missing,
        }
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Delivers a notification to its listener. Runs on the reader task.
    pub fn handle_notification(&self, notification: Notification) {
        let id = notification.subscription;

        // Signature subscriptions end on the node after their one result
        let ends = matches!(
            notification.payload,
            NotificationPayload::Signature(SignatureOutcome::Processed { .. })
        );

        let queue = {
            let mut table = self.table.lock();
            let Some(entry) = table.get(&id) else {
                debug!(subscription = %id, "Discarding notification for unknown subscription");
                return;
            };
            if entry.target.kind() != notification.kind() {
                warn!(
                    subscription = %id,
                    expected = %entry.target.kind(),
                    received = %notification.kind(),
                    "Discarding notification of mismatched kind"
                );
                return;
            }
            if entry.queue.is_closed() {
                // Handle dropped; nobody reads this queue any more
                let kind = entry.target.kind();
                table.remove(&id);
                drop(table);
                self.metrics.subscriptions_closed(1);
                debug!(subscription = %id, "Releasing subscription whose handle was dropped");
                if !ends {
                    spawn_unsubscribe(&Arc::downgrade(&self.dispatcher), kind, id);
                }
                return;
            }
            let queue = Arc::clone(&entry.queue);
            if ends {
                table.remove(&id);
                self.metrics.subscriptions_closed(1);
            }
            queue
        };

        queue.push(SubscriptionEvent::Notification(notification));
        if ends {
            queue.finish();
        }
    }

    /// Applies a connection lifecycle event. Runs on the reader task.
    pub fn handle_connection_event(self: &Arc<Self>, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Dropped => self.on_dropped(),
            ConnectionEvent::Reconnected { .. } => self.on_reconnected(),
            ConnectionEvent::Lost { .. } | ConnectionEvent::Closed => {
                self.close_all();
                self.close_parked();
            }
            ConnectionEvent::Connected => {}
        }
    }

    fn drain_table(&self) -> Vec<(SubscriptionId, Entry)> {
        let drained: Vec<_> = self.table.lock().drain().collect();
        if !drained.is_empty() {
            self.metrics.subscriptions_closed(drained.len());
        }
        drained
    }

    fn on_dropped(&self) {
        if self.settings.resubscribe_on_reconnect {
            let drained = self.drain_table();
            if !drained.is_empty() {
                debug!(count = drained.len(), "Parking subscriptions until reconnect");
            }
            self.parked.lock().extend(
                drained
                    .into_iter()
                    .map(|(_, entry)| entry)
                    .filter(|entry| !entry.queue.is_closed()),
            );
        } else {
            self.close_all();
        }
    }

    fn close_all(&self) {
        let drained = self.drain_table();
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "Closing subscriptions after connection loss");
        for (_, entry) in drained {
            entry.queue.close_with(SubscriptionEvent::ConnectionLost);
        }
    }

    fn close_parked(&self) {
        let parked: Vec<Entry> = self.parked.lock().drain(..).collect();
        for entry in parked {
            entry.queue.close_with(SubscriptionEvent::ConnectionLost);
        }
    }

    fn on_reconnected(self: &Arc<Self>) {
        let parked: Vec<Entry> = self
            .parked
            .lock()
            .drain(..)
            .filter(|entry| !entry.queue.is_closed())
            .collect();
        if parked.is_empty() {
            return;
        }

        info!(count = parked.len(), "Resubscribing after reconnect");
        for entry in parked {
            let claim: SharedClaim = Arc::new(Mutex::new(Claim::Waiting));
            self.resubscribing.lock().push(Resubscribing {
                queue: Arc::clone(&entry.queue),
                claim: Arc::clone(&claim),
            });
            let manager = Arc::clone(self);
            tokio::spawn(async move { manager.resubscribe(entry, claim).await });
        }
    }

    async fn resubscribe(&self, entry: Entry, claim: SharedClaim) {
        let previous = SubscriptionId::new(entry.id.load(Ordering::Acquire));
        let kind = entry.target.kind();
        let queue = Arc::clone(&entry.queue);
        let method = RpcMethod::Subscribe {
            target: entry.target.clone(),
            commitment: entry.commitment,
        };
        let hook = self.install_hook(entry, Arc::clone(&claim), Some(previous));

        let timeout: Duration = self.dispatcher.settings().request_timeout;
        let result = self
            .dispatcher
            .call_hooked(method, timeout, &CancellationToken::new(), Some(hook))
            .await;

        self.resubscribing
            .lock()
            .retain(|pending| !Arc::ptr_eq(&pending.queue, &queue));

        match result {
            Ok(value) if value.as_u64().is_some() => {
                if matches!(*claim.lock(), Claim::Installed(_)) {
                    debug!(%kind, %previous, current = %value, "Resubscribed");
                } else {
                    debug!(%kind, %previous, "Listener gone before resubscribe completed");
                }
            }
            Ok(value) => {
                warn!(%kind, %previous, %value, "Resubscribe returned invalid id");
                queue.close_with(SubscriptionEvent::ConnectionLost);
                self.abandon(&claim, &queue);
            }
            Err(e) => {
                warn!(%kind, %previous, error = %e, "Resubscribe failed");
                queue.close_with(SubscriptionEvent::ConnectionLost);
                self.abandon(&claim, &queue);
            }
        }
    }
}

/// Sends `{kind}Unsubscribe` for `id` in the background.
fn spawn_unsubscribe(dispatcher: &Weak<Dispatcher>, kind: SubscriptionKind, id: SubscriptionId) {
    let Some(dispatcher) = dispatcher.upgrade() else {
        return;
    };
    let Ok(runtime) = Handle::try_current() else {
        debug!(subscription = %id, "No runtime to release subscription on");
        return;
    };

    runtime.spawn(async move {
        let method = RpcMethod::Unsubscribe {
            kind,
            subscription: id,
        };
        if let Err(e) = dispatcher.call(method).await {
            debug!(subscription = %id, error = %e, "Background unsubscribe failed");
        }
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use url::Url;

    use crate::identifiers::Address;
    use crate::protocol::InboundFrame;
    use crate::rpc::DispatchSettings;
    use crate::transport::mock::{MockHttp, MockPeer, PeerConn};
    use crate::transport::{Backoff, ConnectionManager, ConnectionObserver, ReconnectPolicy};

    /// Minimal frame router for these tests.
    struct Router {
        dispatcher: Arc<Dispatcher>,
        subscriptions: Arc<SubscriptionManager>,
    }

    impl ConnectionObserver for Router {
        fn on_frame(&self, text: &str) {
            match InboundFrame::parse(text) {
                Ok(InboundFrame::Response(response)) => self.dispatcher.handle_response(response),
                Ok(InboundFrame::Notification(n)) => self.subscriptions.handle_notification(n),
                Err(_) => {}
            }
        }

        fn on_event(&self, event: ConnectionEvent) {
            if matches!(event, ConnectionEvent::Dropped | ConnectionEvent::Closed) {
                self.dispatcher
                    .fail_route(crate::protocol::Route::WebSocket, || Error::ConnectionLost);
            }
            self.subscriptions.handle_connection_event(event);
        }
    }

    struct Fixture {
        peer: MockPeer,
        manager: Arc<SubscriptionManager>,
        _router: Arc<dyn ConnectionObserver>,
    }

    async fn fixture(resubscribe_on_reconnect: bool, listener_capacity: usize) -> Fixture {
        let peer = MockPeer::bind().await;
        let metrics = Arc::new(Metrics::new());
        let connection = Arc::new(ConnectionManager::new(
            Url::parse("http://127.0.0.1:8899").unwrap(),
            Url::parse(&peer.ws_url()).unwrap(),
            Arc::new(MockHttp::unreachable()),
            ReconnectPolicy {
                backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
                max_attempts: 3,
                connect_timeout: Duration::from_secs(2),
            },
            Arc::clone(&metrics),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&connection),
            Arc::clone(&metrics),
            DispatchSettings {
                request_timeout: Duration::from_secs(2),
                ..DispatchSettings::default()
            },
        ));
        let manager = Arc::new(SubscriptionManager::new(
            Arc::clone(&dispatcher),
            metrics,
            SubscriptionSettings {
                listener_capacity,
                resubscribe_on_reconnect,
            },
        ));
        let router: Arc<dyn ConnectionObserver> = Arc::new(Router {
            dispatcher,
            subscriptions: Arc::clone(&manager),
        });
        connection.set_observer(Arc::downgrade(&router));

        Fixture {
            peer,
            manager,
            _router: router,
        }
    }

    fn account_target(seed: u8) -> SubscriptionTarget {
        SubscriptionTarget::Account(Address::new([seed; 32]))
    }

    fn account_value(lamports: u64) -> Value {
        json!({
            "context": {"slot": 10},
            "value": {
                "owner": Address::new([0; 32]).to_string(),
                "lamports": lamports,
                "data": ["", "base64"],
                "executable": false,
                "rentEpoch": 0
            }
        })
    }

    /// Subscribes and answers on the peer side with `subscription`.
    async fn subscribe(
        fixture: &Fixture,
        conn: Option<&mut PeerConn>,
        seed: u8,
        subscription: u64,
    ) -> (Subscription, Option<PeerConn>) {
        let call = tokio::spawn({
            let manager = Arc::clone(&fixture.manager);
            async move { manager.subscribe(account_target(seed), Commitment::Confirmed).await }
        });

        let mut fresh = None;
        let conn = match conn {
            Some(conn) => conn,
            None => fresh.insert(fixture.peer.accept().await),
        };

        let request = conn.recv_json().await;
        assert_eq!(request["method"], "accountSubscribe");
        conn.respond(&request["id"], json!(subscription)).await;

        (call.await.unwrap().unwrap(), fresh)
    }

    async fn lamports(subscription: &Subscription) -> u64 {
        match tokio::time::timeout(Duration::from_secs(2), subscription.next()).await {
            Ok(Some(SubscriptionEvent::Notification(Notification {
                payload: NotificationPayload::Account(info),
                ..
            }))) => info.lamports,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_notifications_routed_by_id_in_order() {
        let fixture = fixture(false, 16).await;
        let (first, conn) = subscribe(&fixture, None, 1, 11).await;
        let mut conn = conn.unwrap();
        let (second, _) = subscribe(&fixture, Some(&mut conn), 2, 22).await;

        assert_eq!(first.id(), SubscriptionId::new(11));
        assert_eq!(fixture.manager.active_count(), 2);

        conn.notify("accountNotification", 22, account_value(5)).await;
        conn.notify("accountNotification", 11, account_value(1)).await;
        conn.notify("accountNotification", 11, account_value(2)).await;
        conn.notify("accountNotification", 99, account_value(0)).await;

        assert_eq!(lamports(&first).await, 1);
        assert_eq!(lamports(&first).await, 2);
        assert_eq!(lamports(&second).await, 5);
    }

    #[tokio::test]
    async fn test_unsubscribe_twice_reports_not_subscribed() {
        let fixture = fixture(false, 16).await;
        let (subscription, conn) = subscribe(&fixture, None, 1, 7).await;
        let mut conn = conn.unwrap();

        let unsubscribe = tokio::spawn({
            let manager = Arc::clone(&fixture.manager);
            async move {
                let outcome = manager.unsubscribe(&subscription).await;
                (outcome, subscription)
            }
        });

        let request = conn.recv_json().await;
        assert_eq!(request["method"], "accountUnsubscribe");
        assert_eq!(request["params"], json!([7]));

        // A notification racing the unsubscribe must not reach the listener
        conn.notify("accountNotification", 7, account_value(3)).await;
        conn.respond(&request["id"], json!(true)).await;

        let (outcome, subscription) = unsubscribe.await.unwrap();
        assert_eq!(outcome.unwrap(), UnsubscribeOutcome::Unsubscribed);
        assert_eq!(fixture.manager.active_count(), 0);

        let second = fixture.manager.unsubscribe(&subscription).await.unwrap();
        assert_eq!(second, UnsubscribeOutcome::NotSubscribed);
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn test_unsubscribe_error_still_tears_down() {
        let fixture = fixture(false, 16).await;
        let (subscription, conn) = subscribe(&fixture, None, 1, 8).await;
        let mut conn = conn.unwrap();

        let unsubscribe = tokio::spawn({
            let manager = Arc::clone(&fixture.manager);
            async move { manager.unsubscribe(&subscription).await }
        });

        let request = conn.recv_json().await;
        conn.respond_error(&request["id"], -32602, "Invalid subscription id").await;

        let err = unsubscribe.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Rpc { code: -32602, .. }));
        assert_eq!(fixture.manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_rejected() {
        let fixture = fixture(false, 16).await;
        let call = tokio::spawn({
            let manager = Arc::clone(&fixture.manager);
            async move { manager.subscribe(account_target(4), Commitment::Finalized).await }
        });

        let mut conn = fixture.peer.accept().await;
        let request = conn.recv_json().await;
        conn.respond_error(&request["id"], -32602, "Invalid param").await;

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::SubscriptionFailed { .. }));
        assert_eq!(fixture.manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_closes_every_listener() {
        let fixture = fixture(false, 16).await;
        let (first, conn) = subscribe(&fixture, None, 1, 1).await;
        let mut conn = conn.unwrap();
        let (second, _) = subscribe(&fixture, Some(&mut conn), 2, 2).await;

        conn.close().await;

        for subscription in [&first, &second] {
            let event = tokio::time::timeout(Duration::from_secs(2), subscription.next())
                .await
                .unwrap();
            assert_eq!(event, Some(SubscriptionEvent::ConnectionLost));
            assert_eq!(subscription.next().await, None);
        }
        assert_eq!(fixture.manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_after_reconnect() {
        let fixture = fixture(true, 16).await;
        let (subscription, conn) = subscribe(&fixture, None, 1, 5).await;
        conn.unwrap().close().await;

        let mut conn = fixture.peer.accept().await;
        let request = conn.recv_json().await;
        assert_eq!(request["method"], "accountSubscribe");
        conn.respond(&request["id"], json!(50)).await;

        let event = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(SubscriptionEvent::Resubscribed {
                previous: SubscriptionId::new(5),
                current: SubscriptionId::new(50),
            })
        );
        assert_eq!(subscription.id(), SubscriptionId::new(50));

        conn.notify("accountNotification", 50, account_value(9)).await;
        assert_eq!(lamports(&subscription).await, 9);
    }

    #[tokio::test]
    async fn test_signature_notification_ends_subscription() {
        let fixture = fixture(false, 16).await;
        let signature = crate::identifiers::Signature::from([4u8; 64]);

        let call = tokio::spawn({
            let manager = Arc::clone(&fixture.manager);
            async move {
                manager
                    .subscribe(SubscriptionTarget::Signature(signature), Commitment::Finalized)
                    .await
            }
        });
        let mut conn = fixture.peer.accept().await;
        let request = conn.recv_json().await;
        assert_eq!(request["method"], "signatureSubscribe");
        conn.respond(&request["id"], json!(3)).await;
        let subscription = call.await.unwrap().unwrap();

        conn.notify(
            "signatureNotification",
            3,
            json!({"context": {"slot": 12}, "value": {"err": null}}),
        )
        .await;

        let event = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .unwrap();
        assert!(matches!(event, Some(SubscriptionEvent::Notification(_))));
        assert_eq!(subscription.next().await, None);
        assert_eq!(fixture.manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_ack_after_cancel_is_unsubscribed() {
        let fixture = fixture(false, 16).await;
        let cancel = CancellationToken::new();

        let call = tokio::spawn({
            let manager = Arc::clone(&fixture.manager);
            let cancel = cancel.clone();
            async move {
                manager
                    .subscribe_with_cancel(account_target(6), Commitment::Confirmed, &cancel)
                    .await
            }
        });

        let mut conn = fixture.peer.accept().await;
        let request = conn.recv_json().await;
        assert_eq!(request["method"], "accountSubscribe");

        cancel.cancel();
        assert!(matches!(call.await.unwrap(), Err(Error::Cancelled)));

        // The node acknowledges after the caller has gone
        conn.respond(&request["id"], json!(77)).await;

        let release = conn.recv_json().await;
        assert_eq!(release["method"], "accountUnsubscribe");
        assert_eq!(release["params"], json!([77]));
        conn.respond(&release["id"], json!(true)).await;

        assert_eq!(fixture.manager.active_count(), 0);
        assert!(!fixture.manager.is_active(SubscriptionId::new(77)));
    }

    #[tokio::test]
    async fn test_unsubscribe_during_resubscribe() {
        let fixture = fixture(true, 16).await;
        let (subscription, conn) = subscribe(&fixture, None, 1, 5).await;
        conn.unwrap().close().await;

        let mut conn = fixture.peer.accept().await;
        let request = conn.recv_json().await;
        assert_eq!(request["method"], "accountSubscribe");

        // Resubscribe is in flight: neither routed nor parked
        let outcome = fixture.manager.unsubscribe(&subscription).await.unwrap();
        assert_eq!(outcome, UnsubscribeOutcome::Unsubscribed);

        conn.respond(&request["id"], json!(50)).await;

        let release = conn.recv_json().await;
        assert_eq!(release["method"], "accountUnsubscribe");
        assert_eq!(release["params"], json!([50]));
        conn.respond(&release["id"], json!(true)).await;

        assert_eq!(fixture.manager.active_count(), 0);
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn test_dropped_handle_is_released() {
        let fixture = fixture(false, 2).await;
        let (subscription, conn) = subscribe(&fixture, None, 1, 9).await;
        let mut conn = conn.unwrap();
        assert!(fixture.manager.is_active(SubscriptionId::new(9)));

        drop(subscription);
        conn.notify("accountNotification", 9, account_value(1)).await;

        let release = conn.recv_json().await;
        assert_eq!(release["method"], "accountUnsubscribe");
        assert_eq!(release["params"], json!([9]));
        conn.respond(&release["id"], json!(true)).await;

        assert_eq!(fixture.manager.active_count(), 0);
    }
}
