//! Bounded per-listener delivery queue.
//!
//! The reader task pushes without ever waiting. When a listener falls behind
//! and the queue is full, the oldest buffered event is discarded and a
//! warning is logged.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::metrics::Metrics;

use super::handle::SubscriptionEvent;

// ============================================================================
// ListenerQueue
// ============================================================================

struct QueueState {
    buffer: VecDeque<SubscriptionEvent>,
    closed: bool,
}

/// Single-consumer queue with drop-oldest overflow.
pub(crate) struct ListenerQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    metrics: Arc<Metrics>,
}

impl ListenerQueue {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                buffer: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            metrics,
        }
    }

    /// Queues an event. Returns `false` if the queue is closed.
    pub fn push(&self, event: SubscriptionEvent) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            if state.buffer.len() >= self.capacity {
                state.buffer.pop_front();
                self.metrics.notification_dropped();
                warn!(capacity = self.capacity, "Listener queue full, dropped oldest event");
            }
            state.buffer.push_back(event);
        }
        self.metrics.notification_delivered();
        self.notify.notify_one();
        true
    }

    /// Appends `terminal` past the capacity bound, then closes.
    pub fn close_with(&self, terminal: SubscriptionEvent) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.buffer.push_back(terminal);
            state.closed = true;
        }
        self.notify.notify_one();
    }

    /// Closes, keeping buffered events readable.
    pub fn finish(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Closes and discards anything not yet read.
    pub fn clear_and_close(&self) {
        {
            let mut state = self.state.lock();
            state.buffer.clear();
            state.closed = true;
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn try_pop(&self) -> Option<SubscriptionEvent> {
        self.state.lock().buffer.pop_front()
    }

    /// Waits for the next event; `None` once closed and drained.
    pub async fn pop(&self) -> Option<SubscriptionEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(event) = state.buffer.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::SubscriptionId;

    fn resubscribed(n: u64) -> SubscriptionEvent {
        SubscriptionEvent::Resubscribed {
            previous: SubscriptionId::new(n),
            current: SubscriptionId::new(n + 1),
        }
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = ListenerQueue::new(4, Arc::new(Metrics::new()));
        queue.push(resubscribed(1));
        queue.push(resubscribed(2));

        assert_eq!(queue.pop().await, Some(resubscribed(1)));
        assert_eq!(queue.pop().await, Some(resubscribed(2)));
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let metrics = Arc::new(Metrics::new());
        let queue = ListenerQueue::new(2, Arc::clone(&metrics));
        for n in 0..5 {
            assert!(queue.push(resubscribed(n)));
        }

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop(), Some(resubscribed(3)));
        assert_eq!(metrics.snapshot().notifications_dropped, 3);
    }

    #[tokio::test]
    async fn test_close_with_terminal_event() {
        let queue = ListenerQueue::new(1, Arc::new(Metrics::new()));
        queue.push(resubscribed(1));
        queue.close_with(SubscriptionEvent::ConnectionLost);

        assert!(!queue.push(resubscribed(9)));
        assert_eq!(queue.pop().await, Some(resubscribed(1)));
        assert_eq!(queue.pop().await, Some(SubscriptionEvent::ConnectionLost));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_clear_and_close_discards_buffer() {
        let queue = ListenerQueue::new(4, Arc::new(Metrics::new()));
        queue.push(resubscribed(1));
        queue.clear_and_close();

        assert!(queue.is_closed());
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(ListenerQueue::new(4, Arc::new(Metrics::new())));
        let reader = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.pop().await }
        });

        tokio::task::yield_now().await;
        queue.push(resubscribed(7));

        assert_eq!(reader.await.unwrap(), Some(resubscribed(7)));
    }
}
