//! JSON-RPC request dispatch.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatcher` | Id correlation, timeout, cancellation and retry |

// ============================================================================
// Submodules
// ============================================================================

/// Request dispatcher.
pub mod dispatcher;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{
    DEFAULT_MAX_PENDING_REQUESTS, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT, DispatchSettings,
    Dispatcher,
};
