//! Transport layer.
//!
//! This module carries bytes between the client and a node: JSON-RPC bodies
//! over HTTP and a single PubSub WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                          ┌─────────────────┐
//! │  ConnectionManager   │        HTTP POST         │                 │
//! │                      │─────────────────────────►│   RPC node      │
//! │  HttpTransport       │                          │   (port N)      │
//! │                      │        WebSocket         │                 │
//! │  event loop task     │◄────────────────────────►│   PubSub        │
//! │                      │                          │   (port N+1)    │
//! └──────────────────────┘                          └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionManager::new` - No network activity
//! 2. First `ws_send` (or `connect`) opens the socket and spawns the event loop
//! 3. On drop, the loop reconnects with jittered backoff and emits events
//! 4. `ConnectionManager::shutdown` - Close the socket and refuse traffic
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Exponential backoff with full jitter |
//! | `connection` | WebSocket event loop and lifecycle events |
//! | `http` | HTTP transport trait and reqwest implementation |
//! | `manager` | Connection manager |

// ============================================================================
// Submodules
// ============================================================================

/// Exponential backoff with full jitter.
pub mod backoff;

/// WebSocket connection and event loop.
pub mod connection;

/// HTTP transport.
pub mod http;

/// Connection manager.
pub mod manager;

/// Scripted peers for tests.
#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::Backoff;
pub use connection::{
    ConnectionEvent, ConnectionObserver, DEFAULT_CONNECT_TIMEOUT, ReconnectPolicy,
};
pub use http::{HttpTransport, ReqwestTransport};
pub use manager::ConnectionManager;
