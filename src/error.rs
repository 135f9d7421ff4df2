//! Error types for the node client core.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use solana_rpc_core::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let balance = client.get_balance("Vote111111111111111111111111111111111111111").await?;
//!     println!("{balance} lamports");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Local validation | [`Error::InvalidAddress`], [`Error::InvalidSignature`], [`Error::InvalidAmount`], [`Error::InvalidArgument`] |
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionLost`], [`Error::Transport`], [`Error::TooManyPending`] |
//! | Deadlines | [`Error::Timeout`], [`Error::RequestTimeout`], [`Error::Cancelled`] |
//! | Peer | [`Error::Rpc`], [`Error::SubscriptionFailed`], [`Error::Protocol`] |
//! | Lifecycle | [`Error::Confirm`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Signing`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, Signature};
use crate::protocol::SubscriptionKind;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Local Validation Errors
    // ========================================================================
    /// Address did not decode to a 32-byte public key.
    ///
    /// Returned before any network round trip.
    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress {
        /// The rejected textual input.
        input: String,
        /// Why decoding failed.
        reason: String,
    },

    /// Signature did not decode to a 64-byte transaction signature.
    #[error("Invalid signature '{input}': {reason}")]
    InvalidSignature {
        /// The rejected textual input.
        input: String,
        /// Why decoding failed.
        reason: String,
    },

    /// Amount rejected by local validation.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount {
        /// The rejected amount.
        amount: u64,
        /// Why the amount was rejected.
        reason: String,
    },

    /// Any other argument rejected by local validation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The WebSocket dropped while the operation was in flight.
    ///
    /// Always terminal for in-flight calls; future calls may succeed after a reconnect.
    #[error("Connection lost")]
    ConnectionLost,

    /// HTTP exchange failed below the JSON-RPC layer.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// Too many requests awaiting a response.
    #[error("Too many pending requests: {pending}/{max}")]
    TooManyPending {
        /// Requests currently in flight.
        pending: usize,
        /// Configured ceiling.
        max: usize,
    },

    // ========================================================================
    // Deadline Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// JSON-RPC request timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Operation cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Peer Errors
    // ========================================================================
    /// The node rejected the call with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The subscribe RPC itself failed.
    #[error("{kind} subscription failed: {message}")]
    SubscriptionFailed {
        /// Kind of subscription requested.
        kind: SubscriptionKind,
        /// Underlying failure.
        message: String,
    },

    /// Protocol violation or undecodable payload.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Transaction confirmation did not succeed.
    #[error(transparent)]
    Confirm(#[from] ConfirmError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Signing capability failed.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },
}

// ============================================================================
// ConfirmError
// ============================================================================

/// Failure modes of waiting for a transaction to reach a commitment level.
///
/// An on-chain execution failure is never raised at submission time; it only
/// surfaces here as [`ConfirmError::Failed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmError {
    /// No qualifying status update arrived before the deadline.
    #[error("Transaction {signature} not confirmed within {timeout_ms}ms")]
    Timeout {
        /// Tracked signature.
        signature: Signature,
        /// Milliseconds waited.
        timeout_ms: u64,
    },

    /// The node reported an execution error for the transaction.
    #[error("Transaction {signature} failed: {reason}")]
    Failed {
        /// Tracked signature.
        signature: Signature,
        /// Error reported by the node.
        reason: String,
    },

    /// The wait was cancelled by the caller.
    #[error("Confirmation of {signature} cancelled")]
    Cancelled {
        /// Tracked signature.
        signature: Signature,
    },
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid address error.
    #[inline]
    pub fn invalid_address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid signature error.
    #[inline]
    pub fn invalid_signature(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid amount error.
    #[inline]
    pub fn invalid_amount(amount: u64, reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            amount,
            reason: reason.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates an RPC error mirrored from the peer's error object.
    #[inline]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Creates a subscription failed error.
    #[inline]
    pub fn subscription_failed(kind: SubscriptionKind, message: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            kind,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a signing error.
    #[inline]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RequestTimeout { .. }
                | Self::Confirm(ConfirmError::Timeout { .. })
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionLost
                | Self::Transport { .. }
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }

    /// Returns `true` if the error was raised by local validation.
    ///
    /// Such errors never touched the network.
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. }
                | Self::InvalidSignature { .. }
                | Self::InvalidAmount { .. }
                | Self::InvalidArgument { .. }
                | Self::Config { .. }
        )
    }

    /// Returns `true` if an idempotent call may be retried after this error.
    ///
    /// Peer rejections are deterministic and never retried.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RequestTimeout { .. }
                | Self::Connection { .. }
                | Self::ConnectionLost
                | Self::Transport { .. }
                | Self::Http(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::rpc(-32002, "insufficient funds for rent");
        assert_eq!(err.to_string(), "RPC error -32002: insufficient funds for rent");
    }

    #[test]
    fn test_invalid_amount_display() {
        let err = Error::invalid_amount(0, "must be greater than zero");
        assert_eq!(err.to_string(), "Invalid amount 0: must be greater than zero");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(RequestId::new(7), 200);
        let confirm_timeout = Error::from(ConfirmError::Timeout {
            signature: Signature::from([1u8; 64]),
            timeout_ms: 200,
        });
        let other_err = Error::ConnectionLost;

        assert!(timeout_err.is_timeout());
        assert!(confirm_timeout.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_local() {
        assert!(Error::invalid_address("xyz", "bad").is_local());
        assert!(Error::invalid_amount(0, "zero").is_local());
        assert!(!Error::ConnectionLost.is_local());
        assert!(!Error::rpc(1, "x").is_local());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::ConnectionLost.is_retryable());
        assert!(Error::timeout("getBalance", 10).is_retryable());
        assert!(Error::transport("reset").is_retryable());
        assert!(!Error::rpc(-32602, "invalid params").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("refused").is_connection_error());
        assert!(Error::ConnectionLost.is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_confirm_failed_display() {
        let sig = Signature::from([2u8; 64]);
        let err = ConfirmError::Failed {
            signature: sig,
            reason: "InstructionError".into(),
        };
        assert!(err.to_string().ends_with("failed: InstructionError"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
