//! Push subscriptions over the PubSub socket.
//!
//! # Example
//!
//! ```ignore
//! let subscription = client.subscribe_to_account_changes(&address).await?;
//!
//! while let Some(event) = subscription.next().await {
//!     match event {
//!         SubscriptionEvent::Notification(n) => println!("slot {}", n.slot),
//!         SubscriptionEvent::Resubscribed { current, .. } => println!("now {current}"),
//!         SubscriptionEvent::ConnectionLost => break,
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handle` | Caller-side [`Subscription`] and its events |
//! | `manager` | Subscription table and notification routing |
//! | `queue` | Bounded drop-oldest listener queue |

// ============================================================================
// Submodules
// ============================================================================

/// Caller-side subscription handle.
pub mod handle;

/// Subscription manager.
pub mod manager;

mod queue;

// ============================================================================
// Re-exports
// ============================================================================

pub use handle::{Subscription, SubscriptionEvent, UnsubscribeOutcome};
pub use manager::{DEFAULT_LISTENER_CAPACITY, SubscriptionManager, SubscriptionSettings};
