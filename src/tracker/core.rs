//! Transaction lifecycle tracker.
//!
//! One record per signature, advanced by two racing inputs:
//!
//! | Input | Source | Cadence |
//! |-------|--------|---------|
//! | poll | `getSignatureStatuses` over HTTP | every `poll_interval` |
//! | push | `signatureSubscribe` over the socket | when the node reaches the commitment |
//!
//! Neither is authoritative. Both feed [`TransactionRecord::advance`], which
//! ignores anything not strictly later than the current state, so a
//! transition reported by both paths lands once.
//!
//! # Retention
//!
//! Terminal records stay queryable until the table grows past
//! `max_records`; then the oldest terminal records are evicted. Records still
//! in flight are never evicted. [`TransactionTracker::forget`] drops one
//! record on demand.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tokio::time::{Instant as TokioInstant, MissedTickBehavior, interval, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::{ConfirmError, Result};
use crate::identifiers::Signature;
use crate::metrics::Metrics;
use crate::protocol::types::decode_signature_statuses;
use crate::protocol::{
    Commitment, NotificationPayload, RpcMethod, SignatureOutcome, SubscriptionTarget,
};
use crate::rpc::Dispatcher;
use crate::subscription::{SubscriptionEvent, SubscriptionManager};

use super::state::{TransactionRecord, TransactionState};

// ============================================================================
// Constants
// ============================================================================

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Default confirmation deadline.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on tracked records before terminal ones are evicted.
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

// ============================================================================
// Types
// ============================================================================

/// Tracker policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Delay between status polls while awaiting confirmation.
    pub poll_interval: Duration,
    /// Deadline used when the caller gives none.
    pub confirm_timeout: Duration,
    /// Records kept before terminal ones are evicted.
    pub max_records: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

type RecordTable = FxHashMap<Signature, watch::Sender<TransactionRecord>>;

/// Records keyed by signature; each behind a watch channel for waiters.
struct Records {
    table: Mutex<RecordTable>,
    metrics: Arc<Metrics>,
    max_records: usize,
}

impl Records {
    fn sender(&self, signature: &Signature) -> Option<watch::Sender<TransactionRecord>> {
        self.table.lock().get(signature).cloned()
    }

    /// Inserts a `Submitted` record unless one exists.
    fn track(&self, signature: Signature) -> watch::Sender<TransactionRecord> {
        let mut table = self.table.lock();
        if let Some(existing) = table.get(&signature) {
            return existing.clone();
        }
        let (sender, _) = watch::channel(TransactionRecord::new(signature));
        table.insert(signature, sender.clone());
        self.metrics.transaction_tracked();
        debug!(%signature, "Tracking transaction");

        if table.len() > self.max_records {
            self.evict_terminal(&mut table);
        }
        sender
    }

    /// Evicts the oldest terminal records down to three quarters of the bound.
    fn evict_terminal(&self, table: &mut RecordTable) {
        let target = self.max_records - self.max_records / 4;

        let mut terminal: Vec<(Instant, Signature)> = table
            .iter()
            .filter_map(|(signature, sender)| {
                let record = sender.borrow();
                record
                    .state
                    .is_terminal()
                    .then_some((record.first_seen, *signature))
            })
            .collect();
        terminal.sort_unstable_by_key(|(first_seen, _)| *first_seen);

        let excess = table.len().saturating_sub(target);
        let mut evicted = 0usize;
        for (_, signature) in terminal.into_iter().take(excess) {
            table.remove(&signature);
            evicted += 1;
        }

        if evicted > 0 {
            debug!(evicted, remaining = table.len(), "Evicted terminal transaction records");
        }
    }

    fn forget(&self, signature: &Signature) -> Option<TransactionRecord> {
        let sender = self.table.lock().remove(signature)?;
        let record = sender.borrow().clone();
        Some(record)
    }

    fn apply(&self, signature: &Signature, next: TransactionState) -> bool {
        let Some(sender) = self.sender(signature) else {
            return false;
        };

        let mut reached = None;
        let advanced = sender.send_if_modified(|record| {
            let moved = record.advance(next);
            if moved {
                reached = Some(record.state.clone());
            }
            moved
        });

        if let Some(state) = reached {
            debug!(%signature, %state, "Transaction advanced");
            match state {
                TransactionState::Finalized => self.metrics.transaction_finalized(),
                TransactionState::Failed(_) => self.metrics.transaction_failed(),
                TransactionState::TimedOut => self.metrics.transaction_timed_out(),
                _ => {}
            }
        }
        advanced
    }

    fn touch(&self, signature: &Signature) {
        if let Some(sender) = self.sender(signature) {
            sender.send_if_modified(|record| {
                record.last_checked = Some(Instant::now());
                false
            });
        }
    }
}

// ============================================================================
// TransactionTracker
// ============================================================================

/// Drives submitted transactions to a terminal state.
pub struct TransactionTracker {
    records: Arc<Records>,
    dispatcher: Arc<Dispatcher>,
    subscriptions: Arc<SubscriptionManager>,
    settings: TrackerSettings,
}

impl TransactionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        subscriptions: Arc<SubscriptionManager>,
        metrics: Arc<Metrics>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            records: Arc::new(Records {
                table: Mutex::new(FxHashMap::default()),
                metrics,
                max_records: settings.max_records.max(1),
            }),
            dispatcher,
            subscriptions,
            settings,
        }
    }

    /// Returns the tracker policy.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Starts tracking `signature`. Idempotent.
    pub fn track(&self, signature: Signature) -> TransactionRecord {
        self.records.track(signature).borrow().clone()
    }

    /// Feeds an observation. Returns `true` if the record moved.
    pub fn apply(&self, signature: &Signature, next: TransactionState) -> bool {
        self.records.apply(signature, next)
    }

    /// Current record, if tracked.
    #[must_use]
    pub fn status(&self, signature: &Signature) -> Option<TransactionRecord> {
        self.records
            .sender(signature)
            .map(|sender| sender.borrow().clone())
    }

    /// Stops tracking `signature` and returns its last record.
    ///
    /// A confirmation wait still in progress for it ends early with
    /// [`ConfirmError::Timeout`].
    pub fn forget(&self, signature: &Signature) -> Option<TransactionRecord> {
        let record = self.records.forget(signature);
        if record.is_some() {
            trace!(%signature, "Forgot transaction");
        }
        record
    }

    /// Number of tracked signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.table.lock().len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Polls the node once and applies the result. Tracks `signature` if needed.
    ///
    /// # Errors
    ///
    /// Returns the poll call's error; the record is left unchanged.
    pub async fn refresh(&self, signature: &Signature) -> Result<TransactionRecord> {
        self.records.track(*signature);

        let result = self
            .dispatcher
            .call(RpcMethod::GetSignatureStatuses {
                signatures: vec![*signature],
                search_transaction_history: true,
            })
            .await?;
        self.records.touch(signature);

        match decode_signature_statuses(result)?.into_iter().next().flatten() {
            Some(status) => {
                trace!(%signature, slot = status.slot, "Polled status");
                self.records
                    .apply(signature, TransactionState::from_status(&status));
            }
            None => trace!(%signature, "Status not yet available"),
        }

        Ok(self.status(signature).unwrap_or_else(|| TransactionRecord::new(*signature)))
    }

    // ========================================================================
    // Confirmation
    // ========================================================================

    /// Waits until `signature` reaches `target`, fails, or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`ConfirmError::Failed`] if the transaction executed with an error
    /// - [`ConfirmError::Timeout`] if the deadline passed; the record becomes `TimedOut`
    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        target: Commitment,
        timeout: Duration,
    ) -> std::result::Result<TransactionRecord, ConfirmError> {
        self.await_confirmation_with_cancel(signature, target, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`await_confirmation`](Self::await_confirmation), honoring `cancel`.
    ///
    /// # Errors
    ///
    /// Adds [`ConfirmError::Cancelled`]; the record is left as it was.
    pub async fn await_confirmation_with_cancel(
        &self,
        signature: &Signature,
        target: Commitment,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<TransactionRecord, ConfirmError> {
        let deadline = TokioInstant::now() + timeout;
        let timeout_ms = timeout.as_millis() as u64;

        let sender = self.records.track(*signature);
        let mut updates = sender.subscribe();
        drop(sender);

        let current = updates.borrow_and_update().clone();
        if let Some(done) = settle(&current, target, timeout_ms) {
            return done;
        }

        // Push path runs beside us and stops when we return
        let stop = cancel.child_token();
        let _stop_guard = stop.clone().drop_guard();
        tokio::spawn(push_feed(
            Arc::clone(&self.records),
            Arc::clone(&self.subscriptions),
            *signature,
            target,
            stop,
        ));

        let mut poll = interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%signature, "Confirmation wait cancelled");
                    return Err(ConfirmError::Cancelled { signature: *signature });
                }

                _ = sleep_until(deadline) => break,

                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = updates.borrow_and_update().clone();
                    if let Some(done) = settle(&current, target, timeout_ms) {
                        return done;
                    }
                }

                _ = poll.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        polled = timeout_at(deadline, self.refresh(signature)) => {
                            if let Ok(Err(e)) = polled {
                                debug!(%signature, error = %e, "Status poll failed");
                            }
                        }
                    }
                }
            }
        }

        // A final observation may have landed alongside the deadline
        let current = updates.borrow_and_update().clone();
        if let Some(done) = settle(&current, target, timeout_ms) {
            return done;
        }

        self.records.apply(signature, TransactionState::TimedOut);
        info!(%signature, %target, timeout_ms, "Confirmation timed out");
        Err(ConfirmError::Timeout {
            signature: *signature,
            timeout_ms,
        })
    }
}

/// Maps a record to a finished wait, or `None` to keep waiting.
fn settle(
    record: &TransactionRecord,
    target: Commitment,
    timeout_ms: u64,
) -> Option<std::result::Result<TransactionRecord, ConfirmError>> {
    match &record.state {
        TransactionState::Failed(reason) => Some(Err(ConfirmError::Failed {
            signature: record.signature,
            reason: reason.clone(),
        })),
        TransactionState::TimedOut => Some(Err(ConfirmError::Timeout {
            signature: record.signature,
            timeout_ms,
        })),
        state if state.has_reached(target) => Some(Ok(record.clone())),
        _ => None,
    }
}

/// Applies `signatureSubscribe` results until stopped or the node ends it.
///
/// Best effort: if the subscribe fails, polling carries on alone.
async fn push_feed(
    records: Arc<Records>,
    subscriptions: Arc<SubscriptionManager>,
    signature: Signature,
    target: Commitment,
    stop: CancellationToken,
) {
    let subscribed = subscriptions
        .subscribe_with_cancel(SubscriptionTarget::Signature(signature), target, &stop)
        .await;

    let subscription = match subscribed {
        Ok(subscription) => subscription,
        Err(e) => {
            debug!(%signature, error = %e, "Push unavailable, polling only");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            event = subscription.next() => match event {
                Some(SubscriptionEvent::Notification(notification)) => {
                    if let NotificationPayload::Signature(SignatureOutcome::Processed { err }) =
                        notification.payload
                    {
                        let next = match err {
                            Some(reason) => TransactionState::Failed(reason),
                            None => TransactionState::from(target),
                        };
                        records.apply(&signature, next);
                    }
                }
                Some(SubscriptionEvent::Resubscribed { .. }) => {}
                Some(SubscriptionEvent::ConnectionLost) | None => return,
            }
        }
    }

    if !subscription.is_closed() {
        let _ = subscriptions.unsubscribe(&subscription).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
