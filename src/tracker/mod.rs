//! Transaction lifecycle tracking.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`TransactionTracker`]: records, polling, push, confirmation waits |
//! | `state` | [`TransactionState`] machine and [`TransactionRecord`] |

// ============================================================================
// Submodules
// ============================================================================

/// Transaction lifecycle tracker.
pub mod core;

/// Transaction lifecycle states.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{
    DEFAULT_CONFIRM_TIMEOUT, DEFAULT_MAX_RECORDS, DEFAULT_POLL_INTERVAL, TrackerSettings,
    TransactionTracker,
};
pub use state::{TransactionRecord, TransactionState};
