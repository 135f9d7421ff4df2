//! Caller-side subscription handle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::Stream;
use futures_util::stream;

use crate::identifiers::SubscriptionId;
use crate::protocol::{Notification, SubscriptionKind, SubscriptionTarget};

use super::queue::ListenerQueue;

// ============================================================================
// SubscriptionEvent
// ============================================================================

/// An item delivered to a subscription listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// A push notification from the node.
    Notification(Notification),

    /// The subscription was re-established after a reconnect under a new id.
    Resubscribed {
        previous: SubscriptionId,
        current: SubscriptionId,
    },

    /// The socket was lost. Always the last event.
    ConnectionLost,
}

/// Result of an unsubscribe that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// The local listener was torn down and the node acknowledged.
    Unsubscribed,
    /// Nothing to do: already unsubscribed, lost, or ended by the node.
    NotSubscribed,
}

// ============================================================================
// Subscription
// ============================================================================

/// A live subscription.
///
/// Yields events in the order the node sent them until unsubscribed, ended
/// by the node, or the connection is lost. Dropping the handle stops
/// delivery at once; the manager releases the node-side subscription on the
/// next notification for it or the next subscribe, whichever comes first.
pub struct Subscription {
    pub(crate) id: Arc<AtomicU64>,
    pub(crate) target: SubscriptionTarget,
    pub(crate) queue: Arc<ListenerQueue>,
}

impl Subscription {
    /// Current peer-assigned id. Changes after a resubscribe.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        SubscriptionId::new(self.id.load(Ordering::Acquire))
    }

    /// Subscription kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> SubscriptionKind {
        self.target.kind()
    }

    /// What is being watched.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &SubscriptionTarget {
        &self.target
    }

    /// Returns `true` once no further events will be queued.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Number of events buffered and not yet read.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// Waits for the next event. `None` means the subscription has ended.
    pub async fn next(&self) -> Option<SubscriptionEvent> {
        self.queue.pop().await
    }

    /// Returns a buffered event without waiting.
    #[must_use]
    pub fn try_next(&self) -> Option<SubscriptionEvent> {
        self.queue.try_pop()
    }

    /// Converts the handle into a stream of events.
    ///
    /// The stream owns the handle; dropping the stream drops the subscription.
    pub fn into_stream(self) -> impl Stream<Item = SubscriptionEvent> + Send + 'static {
        stream::unfold(self, |subscription| async move {
            let event = subscription.queue.pop().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.clear_and_close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
