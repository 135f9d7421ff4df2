//! Typed JSON-RPC methods.
//!
//! Each variant of [`RpcMethod`] carries exactly the parameters its method
//! accepts. Encoding into the positional `params` array happens in one place,
//! [`RpcMethod::params`], so call sites never build ad-hoc JSON.
//!
//! # Methods
//!
//! | Variant | Method | Route | Idempotent |
//! |---------|--------|-------|------------|
//! | `GetBalance` | `getBalance` | HTTP | yes |
//! | `GetAccountInfo` | `getAccountInfo` | HTTP | yes |
//! | `GetLatestBlockhash` | `getLatestBlockhash` | HTTP | yes |
//! | `GetSignatureStatuses` | `getSignatureStatuses` | HTTP | yes |
//! | `GetMinimumBalanceForRentExemption` | `getMinimumBalanceForRentExemption` | HTTP | yes |
//! | `GetSlot` | `getSlot` | HTTP | yes |
//! | `GetHealth` | `getHealth` | HTTP | yes |
//! | `RequestAirdrop` | `requestAirdrop` | HTTP | no |
//! | `SendTransaction` | `sendTransaction` | HTTP | no |
//! | `Subscribe` | `{kind}Subscribe` | WebSocket | no |
//! | `Unsubscribe` | `{kind}Unsubscribe` | WebSocket | no |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};

use crate::identifiers::{Address, Signature, SubscriptionId};

use super::types::Commitment;

// ============================================================================
// Route
// ============================================================================

/// Which half of the connection carries a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// One-shot HTTP POST.
    Http,
    /// The shared WebSocket.
    WebSocket,
}

// ============================================================================
// SubscriptionKind
// ============================================================================

/// Kind of push-notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    /// Changes to a single account.
    Account,
    /// Changes to any account owned by a program.
    Program,
    /// Status of one transaction signature.
    Signature,
}

impl SubscriptionKind {
    /// Returns the lowercase kind name used as the method prefix.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Program => "program",
            Self::Signature => "signature",
        }
    }

    /// Returns the subscribe method name.
    #[inline]
    #[must_use]
    pub const fn subscribe_method(self) -> &'static str {
        match self {
            Self::Account => "accountSubscribe",
            Self::Program => "programSubscribe",
            Self::Signature => "signatureSubscribe",
        }
    }

    /// Returns the unsubscribe method name.
    #[inline]
    #[must_use]
    pub const fn unsubscribe_method(self) -> &'static str {
        match self {
            Self::Account => "accountUnsubscribe",
            Self::Program => "programUnsubscribe",
            Self::Signature => "signatureUnsubscribe",
        }
    }

    /// Returns the notification method name.
    #[inline]
    #[must_use]
    pub const fn notification_method(self) -> &'static str {
        match self {
            Self::Account => "accountNotification",
            Self::Program => "programNotification",
            Self::Signature => "signatureNotification",
        }
    }

    /// Maps a notification method name back to its kind.
    #[must_use]
    pub fn from_notification_method(method: &str) -> Option<Self> {
        match method {
            "accountNotification" => Some(Self::Account),
            "programNotification" => Some(Self::Program),
            "signatureNotification" => Some(Self::Signature),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SubscriptionTarget
// ============================================================================

/// What a subscription watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionTarget {
    /// An account address.
    Account(Address),
    /// A program id, optionally narrowed by filters.
    Program {
        /// Owning program.
        program: Address,
        /// Server-side account filters.
        filters: Vec<ProgramFilter>,
    },
    /// A transaction signature.
    Signature(Signature),
}

impl SubscriptionTarget {
    /// Returns the subscription kind for this target.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            Self::Account(_) => SubscriptionKind::Account,
            Self::Program { .. } => SubscriptionKind::Program,
            Self::Signature(_) => SubscriptionKind::Signature,
        }
    }
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(address) => write!(f, "{address}"),
            Self::Program { program, .. } => write!(f, "{program}"),
            Self::Signature(signature) => write!(f, "{signature}"),
        }
    }
}

/// Server-side filter for program subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgramFilter {
    /// Account data length equals the given size.
    DataSize(u64),
    /// Account data at `offset` starts with `bytes`.
    Memcmp {
        /// Byte offset into account data.
        offset: u64,
        /// Bytes to compare.
        bytes: Vec<u8>,
    },
}

impl ProgramFilter {
    fn to_value(&self) -> Value {
        match self {
            Self::DataSize(size) => json!({ "dataSize": size }),
            Self::Memcmp { offset, bytes } => json!({
                "memcmp": {
                    "offset": offset,
                    "bytes": bs58::encode(bytes).into_string(),
                }
            }),
        }
    }
}

// ============================================================================
// RpcMethod
// ============================================================================

/// A JSON-RPC call with its typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcMethod {
    /// Lamport balance of an account.
    GetBalance {
        /// Account to query.
        address: Address,
        /// Read commitment.
        commitment: Commitment,
    },

    /// Full account snapshot.
    GetAccountInfo {
        /// Account to query.
        address: Address,
        /// Read commitment.
        commitment: Commitment,
    },

    /// Recent blockhash for transaction construction.
    GetLatestBlockhash {
        /// Read commitment.
        commitment: Commitment,
    },

    /// Status of one or more submitted transactions.
    GetSignatureStatuses {
        /// Signatures to query.
        signatures: Vec<Signature>,
        /// Search beyond the recent status cache.
        search_transaction_history: bool,
    },

    /// Minimum balance for an account of `space` bytes to be rent exempt.
    GetMinimumBalanceForRentExemption {
        /// Account data length.
        space: u64,
    },

    /// Current slot.
    GetSlot {
        /// Read commitment.
        commitment: Commitment,
    },

    /// Node health check.
    GetHealth,

    /// Faucet request (test clusters only).
    RequestAirdrop {
        /// Recipient.
        address: Address,
        /// Amount in lamports.
        lamports: u64,
        /// Commitment used to pick the blockhash.
        commitment: Commitment,
    },

    /// Submit a signed, base64-encoded transaction.
    SendTransaction {
        /// Wire transaction, base64.
        transaction: String,
        /// Skip the node's preflight simulation.
        skip_preflight: bool,
        /// Commitment for preflight simulation.
        preflight_commitment: Commitment,
    },

    /// Open a push-notification stream.
    Subscribe {
        /// What to watch.
        target: SubscriptionTarget,
        /// Commitment at which notifications fire.
        commitment: Commitment,
    },

    /// Close a push-notification stream.
    Unsubscribe {
        /// Kind of the stream being closed.
        kind: SubscriptionKind,
        /// Peer-assigned id.
        subscription: SubscriptionId,
    },
}

impl RpcMethod {
    /// Returns the JSON-RPC method name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetBalance { .. } => "getBalance",
            Self::GetAccountInfo { .. } => "getAccountInfo",
            Self::GetLatestBlockhash { .. } => "getLatestBlockhash",
            Self::GetSignatureStatuses { .. } => "getSignatureStatuses",
            Self::GetMinimumBalanceForRentExemption { .. } => "getMinimumBalanceForRentExemption",
            Self::GetSlot { .. } => "getSlot",
            Self::GetHealth => "getHealth",
            Self::RequestAirdrop { .. } => "requestAirdrop",
            Self::SendTransaction { .. } => "sendTransaction",
            Self::Subscribe { target, .. } => target.kind().subscribe_method(),
            Self::Unsubscribe { kind, .. } => kind.unsubscribe_method(),
        }
    }

    /// Encodes the positional `params` array.
    #[must_use]
    pub fn params(&self) -> Vec<Value> {
        match self {
            Self::GetBalance {
                address,
                commitment,
            } => vec![json!(address.to_string()), commitment.config()],

            Self::GetAccountInfo {
                address,
                commitment,
            } => vec![
                json!(address.to_string()),
                json!({ "encoding": "base64", "commitment": commitment.as_str() }),
            ],

            Self::GetLatestBlockhash { commitment } | Self::GetSlot { commitment } => {
                vec![commitment.config()]
            }

            Self::GetSignatureStatuses {
                signatures,
                search_transaction_history,
            } => vec![
                Value::Array(signatures.iter().map(|s| json!(s.to_string())).collect()),
                json!({ "searchTransactionHistory": search_transaction_history }),
            ],

            Self::GetMinimumBalanceForRentExemption { space } => vec![json!(space)],

            Self::GetHealth => Vec::new(),

            Self::RequestAirdrop {
                address,
                lamports,
                commitment,
            } => vec![
                json!(address.to_string()),
                json!(lamports),
                commitment.config(),
            ],

            Self::SendTransaction {
                transaction,
                skip_preflight,
                preflight_commitment,
            } => vec![
                json!(transaction),
                json!({
                    "encoding": "base64",
                    "skipPreflight": skip_preflight,
                    "preflightCommitment": preflight_commitment.as_str(),
                }),
            ],

            Self::Subscribe { target, commitment } => match target {
                SubscriptionTarget::Account(address) => vec![
                    json!(address.to_string()),
                    json!({ "encoding": "base64", "commitment": commitment.as_str() }),
                ],
                SubscriptionTarget::Program { program, filters } => {
                    let mut config =
                        json!({ "encoding": "base64", "commitment": commitment.as_str() });
                    if !filters.is_empty() {
                        config["filters"] =
                            Value::Array(filters.iter().map(ProgramFilter::to_value).collect());
                    }
                    vec![json!(program.to_string()), config]
                }
                SubscriptionTarget::Signature(signature) => vec![
                    json!(signature.to_string()),
                    commitment.config(),
                ],
            },

            Self::Unsubscribe { subscription, .. } => vec![json!(subscription.as_u64())],
        }
    }

    /// Returns `true` if repeating the call cannot change chain state.
    ///
    /// Only these calls are retried automatically.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Self::GetBalance { .. }
                | Self::GetAccountInfo { .. }
                | Self::GetLatestBlockhash { .. }
                | Self::GetSignatureStatuses { .. }
                | Self::GetMinimumBalanceForRentExemption { .. }
                | Self::GetSlot { .. }
                | Self::GetHealth
        )
    }

    /// Returns the connection half that carries this method.
    #[must_use]
    pub fn route(&self) -> Route {
        match self {
            Self::Subscribe { .. } | Self::Unsubscribe { .. } => Route::WebSocket,
            _ => Route::Http,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
