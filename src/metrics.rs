//! Passive counters shared by every component.
//!
//! Components bump atomics as they work; callers only ever read a
//! [`MetricsSnapshot`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

// ============================================================================
// Metrics
// ============================================================================

/// Live counters. Shared behind an `Arc` by the client's components.
#[derive(Debug, Default)]
pub struct Metrics {
    requests_sent: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    rpc_errors: AtomicU64,
    latency_micros_total: AtomicU64,
    latency_samples: AtomicU64,
    notifications_delivered: AtomicU64,
    notifications_dropped: AtomicU64,
    active_subscriptions: AtomicI64,
    reconnects: AtomicU64,
    transactions_tracked: AtomicU64,
    transactions_finalized: AtomicU64,
    transactions_failed: AtomicU64,
    transactions_timed_out: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests handed to a transport.
    pub requests_sent: u64,
    /// Requests resolved with a result.
    pub requests_succeeded: u64,
    /// Requests resolved with any error.
    pub requests_failed: u64,
    /// Automatic retries of idempotent reads.
    pub retries: u64,
    /// Requests that hit their deadline.
    pub timeouts: u64,
    /// Requests rejected by the node.
    pub rpc_errors: u64,
    /// Mean request latency in milliseconds.
    pub average_latency_ms: f64,
    /// Notifications queued to a listener.
    pub notifications_delivered: u64,
    /// Notifications discarded by listener overflow.
    pub notifications_dropped: u64,
    /// Subscriptions currently routed.
    pub active_subscriptions: u64,
    /// Successful WebSocket reconnects.
    pub reconnects: u64,
    /// Signatures registered with the tracker.
    pub transactions_tracked: u64,
    /// Signatures that reached `Finalized`.
    pub transactions_finalized: u64,
    /// Signatures that ended `Failed`.
    pub transactions_failed: u64,
    /// Signatures that ended `TimedOut`.
    pub transactions_timed_out: u64,
}

impl Metrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn request_succeeded(&self, latency: Duration) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub(crate) fn request_failed(&self, latency: Duration) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub(crate) fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rpc_error(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn notification_delivered(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscription_opened(&self) {
        self.active_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscriptions_closed(&self, count: usize) {
        self.active_subscriptions
            .fetch_sub(count as i64, Ordering::Relaxed);
    }

    pub(crate) fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_tracked(&self) {
        self.transactions_tracked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_finalized(&self) {
        self.transactions_finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_failed(&self) {
        self.transactions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_timed_out(&self) {
        self.transactions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros_total
            .fetch_add(micros, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let total = self.latency_micros_total.load(Ordering::Relaxed);
        let average_latency_ms = if samples == 0 {
            0.0
        } else {
            total as f64 / samples as f64 / 1000.0
        };

        MetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            average_latency_ms,
            notifications_delivered: self.notifications_delivered.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            active_subscriptions: self.active_subscriptions.load(Ordering::Relaxed).max(0) as u64,
            reconnects: self.reconnects.load(Ordering::Relaxed),
            transactions_tracked: self.transactions_tracked.load(Ordering::Relaxed),
            transactions_finalized: self.transactions_finalized.load(Ordering::Relaxed),
            transactions_failed: self.transactions_failed.load(Ordering::Relaxed),
            transactions_timed_out: self.transactions_timed_out.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_starts_zeroed() {
        assert_eq!(Metrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_average_latency() {
        let metrics = Metrics::new();
        metrics.request_succeeded(Duration::from_millis(10));
        metrics.request_failed(Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_succeeded, 1);
        assert_eq!(snapshot.requests_failed, 1);
        assert!((snapshot.average_latency_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_active_subscriptions_gauge() {
        let metrics = Metrics::new();
        metrics.subscription_opened();
        metrics.subscription_opened();
        metrics.subscriptions_closed(1);
        assert_eq!(metrics.snapshot().active_subscriptions, 1);
    }
}
