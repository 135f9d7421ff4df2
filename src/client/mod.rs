//! High-level node client.
//!
//! A [`Client`] wires one [`ConnectionManager`](crate::transport::ConnectionManager),
//! [`Dispatcher`](crate::rpc::Dispatcher),
//! [`SubscriptionManager`](crate::subscription::SubscriptionManager) and
//! [`TransactionTracker`](crate::tracker::TransactionTracker) together and
//! exposes the domain operations on top of them.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ClientBuilder`] |
//! | `config` | [`ClientConfig`], [`Endpoint`], [`Cluster`] |
//! | `core` | Client struct, frame routing, health and slot |
//! | `accounts` | Wallets, balances, account info, airdrops |
//! | `transactions` | Transfers, program instructions, confirmation |
//! | `programs` | Program accounts and tokens |
//! | `subscriptions` | Account, program and signature streams |
//! | `instruction` | System and token instruction builders |
//! | `transaction` | Legacy message and transaction encoding |
//! | `wallet` | [`Signer`] and [`Keypair`] |
//!
//! # Example
//!
//! ```ignore
//! let client = Client::builder().cluster(Cluster::Devnet).build()?;
//! let wallet = client.create_wallet();
//!
//! let airdrop = client.request_airdrop(&wallet.pubkey(), 1_000_000_000).await?;
//! client.confirm_transaction(&airdrop, Commitment::Confirmed).await?;
//!
//! let signature = client.send_transaction(&wallet, &recipient, 5_000).await?;
//! let record = client.confirm_transaction(&signature, Commitment::Finalized).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod accounts;
mod builder;
mod config;
mod core;
mod programs;
mod subscriptions;
mod transactions;

/// System and token program instruction builders.
pub mod instruction;

/// Legacy transaction encoding.
pub mod transaction;

/// Signing capability.
pub mod wallet;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Client;
pub use builder::ClientBuilder;
pub use config::{
    ClientConfig, Cluster, DEFAULT_MAX_RECONNECT_ATTEMPTS, Endpoint, derive_ws_url,
};
pub use transaction::{AccountMeta, Instruction, Message, Transaction};
pub use wallet::{Keypair, Signer};
