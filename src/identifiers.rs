//! Type-safe identifiers.
//!
//! Newtype wrappers keep request ids, subscription ids, public keys and
//! transaction signatures from being mixed up at compile time.
//!
//! | Type | Wire form | Namespace |
//! |------|-----------|-----------|
//! | [`RequestId`] | JSON number | Local, allocated by the dispatcher |
//! | [`SubscriptionId`] | JSON number | Remote, assigned by the node |
//! | [`Address`] | base-58, 32 bytes | Value type |
//! | [`Signature`] | base-58, 64 bytes | Value type |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::result::Result as StdResult;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Byte length of an ed25519 public key.
pub const ADDRESS_LEN: usize = 32;

/// Byte length of an ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

// ============================================================================
// RequestId
// ============================================================================

/// JSON-RPC request identifier.
///
/// Unique among in-flight requests of one dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic allocator for [`RequestId`]s.
///
/// Ids start at 1 and wrap only after `u64::MAX` requests.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator {
    /// Creates a generator starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocates the next id.
    #[inline]
    pub fn next_id(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Peer-assigned subscription identifier.
///
/// Distinct from the [`RequestId`] of the subscribe call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Address
// ============================================================================

/// Public key address.
///
/// Parsed once from base-58; the binary form is what the crate carries
/// around, the text form is produced on display.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Wraps raw key bytes.
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Parses a base-58 address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the input is not base-58 or does
    /// not decode to exactly 32 bytes.
    pub fn parse(input: &str) -> Result<Self> {
        let bytes = bs58::decode(input)
            .into_vec()
            .map_err(|e| Error::invalid_address(input, e.to_string()))?;

        let bytes: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::invalid_address(input, format!("expected {ADDRESS_LEN} bytes, got {}", v.len()))
        })?;

        Ok(Self(bytes))
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Transaction signature, the identifier of a submitted transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    /// Returns the raw signature bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Parses a base-58 signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] on malformed input.
    pub fn parse(input: &str) -> Result<Self> {
        let bytes = bs58::decode(input)
            .into_vec()
            .map_err(|e| Error::invalid_signature(input, e.to_string()))?;

        let bytes: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::invalid_signature(
                input,
                format!("expected {SIGNATURE_LEN} bytes, got {}", v.len()),
            )
        })?;

        Ok(Self(bytes))
    }
}

impl From<[u8; SIGNATURE_LEN]> for Signature {
    fn from(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Argument Conversion
// ============================================================================

/// Accepts an [`Address`] or its base-58 text where an address is expected.
pub trait ToAddress {
    /// Converts, validating text input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for malformed text.
    fn to_address(&self) -> Result<Address>;
}

impl ToAddress for Address {
    #[inline]
    fn to_address(&self) -> Result<Address> {
        Ok(*self)
    }
}

impl ToAddress for str {
    #[inline]
    fn to_address(&self) -> Result<Address> {
        Address::parse(self)
    }
}

impl ToAddress for String {
    #[inline]
    fn to_address(&self) -> Result<Address> {
        Address::parse(self)
    }
}

/// Accepts a [`Signature`] or its base-58 text where a signature is expected.
pub trait ToSignature {
    /// Converts, validating text input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] for malformed text.
    fn to_signature(&self) -> Result<Signature>;
}

impl ToSignature for Signature {
    #[inline]
    fn to_signature(&self) -> Result<Signature> {
        Ok(*self)
    }
}

impl ToSignature for str {
    #[inline]
    fn to_signature(&self) -> Result<Signature> {
        Signature::parse(self)
    }
}

impl ToSignature for String {
    #[inline]
    fn to_signature(&self) -> Result<Signature> {
        Signature::parse(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
