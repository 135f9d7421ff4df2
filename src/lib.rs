//! Solana RPC Core - async node client for JSON-RPC and PubSub.
//!
//! This library talks to a Solana node over two channels: one-shot
//! JSON-RPC calls over HTTP and a single long-lived WebSocket carrying
//! subscription traffic. It correlates replies, fans out push
//! notifications and follows submitted transactions to a final state.
//!
//! # Architecture
//!
//! | Layer | Owns |
//! |-------|------|
//! | Connection Manager | HTTP transport, the socket, reconnect with backoff |
//! | Request Dispatcher | Request ids, pending calls, timeout, retry of reads |
//! | Subscription Manager | Subscription table, per-listener bounded queues |
//! | Transaction Tracker | One monotonic record per signature, push and poll |
//! | Client | Validation and the domain operations |
//! | Metrics | Passive counters read through snapshots |
//!
//! Key design principles:
//!
//! - One reader task owns the socket; slow listeners never stall it
//! - Local validation errors never reach the network
//! - Only idempotent reads are retried automatically
//! - Submission success and execution success are separate events
//!
//! # Quick Start
//!
//! ```no_run
//! use solana_rpc_core::{Client, Cluster, Commitment, Result, Signer};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().cluster(Cluster::Devnet).build()?;
//!
//!     let wallet = client.create_wallet();
//!     let airdrop = client.request_airdrop(&wallet.pubkey(), 1_000_000_000).await?;
//!     client.confirm_transaction(&airdrop, Commitment::Confirmed).await?;
//!
//!     println!("metrics: {:?}", client.get_metrics());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], builder, config and domain operations |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ids, addresses and signatures |
//! | [`metrics`] | Counters and [`MetricsSnapshot`] |
//! | [`protocol`] | JSON-RPC wire types |
//! | [`rpc`] | Request dispatcher |
//! | [`subscription`] | Subscription manager and handles |
//! | [`tracker`] | Transaction lifecycle tracking |
//! | [`transport`] | HTTP and WebSocket transport |

// ============================================================================
// Modules
// ============================================================================

/// Node client and domain operations.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible ids at compile time.
pub mod identifiers;

/// Passive counters and timers.
pub mod metrics;

/// JSON-RPC protocol message types.
pub mod protocol;

/// Request correlation, timeout and retry.
pub mod rpc;

/// Push subscriptions.
pub mod subscription;

/// Transaction lifecycle tracking.
pub mod tracker;

/// HTTP and WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    AccountMeta, Client, ClientBuilder, ClientConfig, Cluster, Endpoint, Instruction, Keypair,
    Signer, Transaction,
};

// Error types
pub use error::{ConfirmError, Error, Result};

// Identifier types
pub use identifiers::{Address, RequestId, Signature, SubscriptionId, ToAddress, ToSignature};

// Metrics
pub use metrics::MetricsSnapshot;

// Protocol types
pub use protocol::{
    AccountInfo, Commitment, KeyedAccount, Notification, NotificationPayload, ProgramFilter,
    SignatureOutcome, SubscriptionKind,
};

// Component types
pub use subscription::{Subscription, SubscriptionEvent, UnsubscribeOutcome};
pub use tracker::{TransactionRecord, TransactionState};
pub use transport::{Backoff, ConnectionEvent};
