//! Typed result payloads and their decoders.
//!
//! Node responses arrive as JSON. Each method's result shape is decoded here
//! into a strongly-typed value at the boundary, so nothing above the protocol
//! layer handles untyped maps.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::Address;

// ============================================================================
// Commitment
// ============================================================================

/// Degree of finality assurance for a read or a transaction.
///
/// Ordered: `Processed < Confirmed < Finalized`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Seen by the connected node, may still be rolled back.
    Processed,
    /// Voted on by a supermajority of the cluster.
    #[default]
    Confirmed,
    /// Rooted, cannot be rolled back.
    Finalized,
}

impl Commitment {
    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Returns the `{"commitment": ..}` config object accepted by most methods.
    #[inline]
    #[must_use]
    pub fn config(self) -> Value {
        serde_json::json!({ "commitment": self.as_str() })
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(Error::invalid_argument(format!(
                "unknown commitment level '{other}' (expected processed, confirmed or finalized)"
            ))),
        }
    }
}

// ============================================================================
// Context Wrapper
// ============================================================================

/// Node context attached to most read results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RpcContext {
    /// Slot at which the value was read.
    pub slot: u64,
}

/// `{ "context": {..}, "value": T }` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WithContext<T> {
    /// Read context.
    pub context: RpcContext,
    /// The actual value.
    pub value: T,
}

// ============================================================================
// AccountInfo
// ============================================================================

/// Snapshot of an on-chain account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Program that owns the account.
    pub owner: Address,
    /// Native balance in lamports.
    pub lamports: u64,
    /// Raw account data.
    pub data: Vec<u8>,
    /// Whether the account holds a loaded program.
    pub executable: bool,
    /// Epoch at which rent is next due.
    pub rent_epoch: u64,
}

/// Account as it appears on the wire with `"encoding": "base64"`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiAccount {
    owner: String,
    lamports: u64,
    data: (String, String),
    executable: bool,
    // Exceeds u64 as float on some nodes; see `decode_rent_epoch`.
    rent_epoch: Value,
}

impl AccountInfo {
    /// Decodes a base64-encoded account object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the shape or encoding is unexpected.
    pub fn from_value(value: Value) -> Result<Self> {
        let ui: UiAccount = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("malformed account: {e}")))?;

        let (encoded, encoding) = ui.data;
        if encoding != "base64" {
            return Err(Error::protocol(format!(
                "unsupported account encoding '{encoding}'"
            )));
        }

        let data = Base64Standard
            .decode(encoded.as_bytes())
            .map_err(|e| Error::protocol(format!("account data is not base64: {e}")))?;

        Ok(Self {
            owner: Address::parse(&ui.owner)?,
            lamports: ui.lamports,
            data,
            executable: ui.executable,
            rent_epoch: decode_rent_epoch(&ui.rent_epoch),
        })
    }
}

/// Rent-exempt accounts report `u64::MAX`, which some nodes serialize as a float.
fn decode_rent_epoch(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| if f >= u64::MAX as f64 { u64::MAX } else { f as u64 }))
        .unwrap_or_default()
}

/// Account paired with its address, as delivered by program subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedAccount {
    /// Account address.
    pub pubkey: Address,
    /// Account snapshot.
    pub account: AccountInfo,
}

impl KeyedAccount {
    /// Decodes a `{ "pubkey": .., "account": {..} }` object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on unexpected shape.
    pub fn from_value(mut value: Value) -> Result<Self> {
        let pubkey = value
            .get("pubkey")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("keyed account without pubkey"))?;
        let pubkey = Address::parse(pubkey)?;
        let account = value
            .get_mut("account")
            .map(Value::take)
            .ok_or_else(|| Error::protocol("keyed account without account"))?;

        Ok(Self {
            pubkey,
            account: AccountInfo::from_value(account)?,
        })
    }
}

// ============================================================================
// SignatureStatus
// ============================================================================

/// Status of a submitted transaction as reported by `getSignatureStatuses`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    /// Slot in which the transaction was processed.
    pub slot: u64,
    /// Confirmations, `None` once rooted.
    #[serde(default)]
    pub confirmations: Option<u64>,
    /// Execution error, `None` on success.
    #[serde(default)]
    pub err: Option<Value>,
    /// Highest commitment reached.
    #[serde(default)]
    pub confirmation_status: Option<Commitment>,
}

impl SignatureStatus {
    /// Returns the commitment level reached.
    ///
    /// Older nodes omit `confirmationStatus`; a missing `confirmations`
    /// count then means the slot is rooted.
    #[must_use]
    pub fn commitment(&self) -> Commitment {
        match (self.confirmation_status, self.confirmations) {
            (Some(level), _) => level,
            (None, None) => Commitment::Finalized,
            (None, Some(_)) => Commitment::Processed,
        }
    }

    /// Returns the execution error rendered as text, if any.
    #[must_use]
    pub fn error_reason(&self) -> Option<String> {
        self.err.as_ref().map(Value::to_string)
    }
}

// ============================================================================
// Blockhash
// ============================================================================

/// Recent blockhash used to anchor a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlockhash {
    /// The blockhash bytes.
    pub blockhash: [u8; 32],
    /// Last block height at which the blockhash is accepted.
    pub last_valid_block_height: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

// ============================================================================
// Decoders
// ============================================================================

/// Decodes a `getBalance` result.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on unexpected shape.
pub fn decode_balance(result: Value) -> Result<u64> {
    let wrapped: WithContext<u64> = decode(result, "getBalance")?;
    Ok(wrapped.value)
}

/// Decodes a `getAccountInfo` result; `None` when the account does not exist.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on unexpected shape.
pub fn decode_account_info(result: Value) -> Result<Option<AccountInfo>> {
    let wrapped: WithContext<Value> = decode(result, "getAccountInfo")?;
    match wrapped.value {
        Value::Null => Ok(None),
        value => AccountInfo::from_value(value).map(Some),
    }
}

/// Decodes a `getSignatureStatuses` result into one entry per queried signature.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on unexpected shape.
pub fn decode_signature_statuses(result: Value) -> Result<Vec<Option<SignatureStatus>>> {
    let wrapped: WithContext<Vec<Option<SignatureStatus>>> =
        decode(result, "getSignatureStatuses")?;
    Ok(wrapped.value)
}

/// Decodes a `getLatestBlockhash` result.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on unexpected shape or bad base-58.
pub fn decode_latest_blockhash(result: Value) -> Result<LatestBlockhash> {
    let wrapped: WithContext<UiBlockhash> = decode(result, "getLatestBlockhash")?;
    let bytes = bs58::decode(&wrapped.value.blockhash)
        .into_vec()
        .map_err(|e| Error::protocol(format!("blockhash is not base-58: {e}")))?;
    let blockhash: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::protocol("blockhash is not 32 bytes"))?;

    Ok(LatestBlockhash {
        blockhash,
        last_valid_block_height: wrapped.value.last_valid_block_height,
    })
}

/// Decodes a bare `u64` result (`getSlot`, `getMinimumBalanceForRentExemption`).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the result is not an unsigned integer.
pub fn decode_u64(result: Value, method: &str) -> Result<u64> {
    result
        .as_u64()
        .ok_or_else(|| Error::protocol(format!("{method}: expected integer, got {result}")))
}

/// Decodes a bare base-58 signature result (`sendTransaction`, `requestAirdrop`).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the result is not a signature string.
pub fn decode_signature(result: Value, method: &str) -> Result<crate::identifiers::Signature> {
    let text = result
        .as_str()
        .ok_or_else(|| Error::protocol(format!("{method}: expected signature, got {result}")))?;
    crate::identifiers::Signature::parse(text)
}

fn decode<T: serde::de::DeserializeOwned>(result: Value, method: &str) -> Result<T> {
    serde_json::from_value(result).map_err(|e| Error::protocol(format!("{method}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
