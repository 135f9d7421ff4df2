//! JSON-RPC protocol message types.
//!
//! This module defines the wire format spoken with the node over both HTTP
//! and the WebSocket.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `RpcRequest` | Local → Node | Method call |
//! | `RpcResponse` | Node → Local | Result or error object |
//! | `Notification` | Node → Local | Subscription push |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `method` | Typed method definitions |
//! | `notification` | Notification decoding |
//! | `request` | Request/response envelopes |
//! | `types` | Result payloads and decoders |

// ============================================================================
// Submodules
// ============================================================================

/// Typed JSON-RPC methods.
pub mod method;

/// Push notification types.
pub mod notification;

/// Request and response envelopes.
pub mod request;

/// Result payloads and decoders.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use method::{ProgramFilter, Route, RpcMethod, SubscriptionKind, SubscriptionTarget};
pub use notification::{Notification, NotificationPayload, SignatureOutcome};
pub use request::{InboundFrame, RpcErrorObject, RpcRequest, RpcResponse, parse_responses};
pub use types::{
    AccountInfo, Commitment, KeyedAccount, LatestBlockhash, RpcContext, SignatureStatus,
    WithContext,
};
