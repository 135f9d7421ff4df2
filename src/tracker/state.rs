//! Transaction lifecycle states.
//!
//! ```text
//! Submitted ──► Processed ──► Confirmed ──► Finalized
//!     │             │             │
//!     └─────────────┴─────────────┴──► Failed(reason) | TimedOut
//! ```
//!
//! Progress only ever moves right. `Finalized`, `Failed` and `TimedOut`
//! are terminal.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Instant;

use crate::identifiers::Signature;
use crate::protocol::{Commitment, SignatureStatus};

// ============================================================================
// TransactionState
// ============================================================================

/// Where a submitted transaction is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Sent, no status observed yet.
    Submitted,
    /// Included in a block on the node's fork.
    Processed,
    /// Voted on by a supermajority.
    Confirmed,
    /// Rooted.
    Finalized,
    /// Executed with an error.
    Failed(String),
    /// No qualifying status before the caller's deadline.
    TimedOut,
}

impl TransactionState {
    /// Position on the happy path; `None` for `Failed` and `TimedOut`.
    #[must_use]
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Submitted => Some(0),
            Self::Processed => Some(1),
            Self::Confirmed => Some(2),
            Self::Finalized => Some(3),
            Self::Failed(_) | Self::TimedOut => None,
        }
    }

    /// Returns `true` for `Finalized`, `Failed` and `TimedOut`.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Failed(_) | Self::TimedOut)
    }

    /// Returns `true` if `next` is strictly later than `self`.
    #[must_use]
    pub fn can_advance_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(target)) => target > current,
            (None, Some(_)) => false,
        }
    }

    /// Returns `true` if the happy path has reached `commitment`.
    #[must_use]
    pub fn has_reached(&self, commitment: Commitment) -> bool {
        match (self.rank(), Self::from(commitment).rank()) {
            (Some(current), Some(target)) => current >= target,
            _ => false,
        }
    }

    /// Commitment level matching this state, if any.
    #[must_use]
    pub fn commitment(&self) -> Option<Commitment> {
        match self {
            Self::Processed => Some(Commitment::Processed),
            Self::Confirmed => Some(Commitment::Confirmed),
            Self::Finalized => Some(Commitment::Finalized),
            _ => None,
        }
    }

    /// State implied by a polled status.
    #[must_use]
    pub fn from_status(status: &SignatureStatus) -> Self {
        match status.error_reason() {
            Some(reason) => Self::Failed(reason),
            None => Self::from(status.commitment()),
        }
    }
}

impl From<Commitment> for TransactionState {
    fn from(commitment: Commitment) -> Self {
        match commitment {
            Commitment::Processed => Self::Processed,
            Commitment::Confirmed => Self::Confirmed,
            Commitment::Finalized => Self::Finalized,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => f.write_str("submitted"),
            Self::Processed => f.write_str("processed"),
            Self::Confirmed => f.write_str("confirmed"),
            Self::Finalized => f.write_str("finalized"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

// ============================================================================
// TransactionRecord
// ============================================================================

/// Tracked lifecycle of one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Transaction signature.
    pub signature: Signature,
    /// Current state.
    pub state: TransactionState,
    /// When tracking began.
    pub first_seen: Instant,
    /// Last status poll, if any.
    pub last_checked: Option<Instant>,
    /// Highest commitment observed.
    pub commitment_reached: Option<Commitment>,
}

impl TransactionRecord {
    /// Creates a `Submitted` record.
    #[must_use]
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            state: TransactionState::Submitted,
            first_seen: Instant::now(),
            last_checked: None,
            commitment_reached: None,
        }
    }

    /// Moves to `next` if it is strictly later. Returns `true` if it moved.
    pub fn advance(&mut self, next: TransactionState) -> bool {
        if !self.state.can_advance_to(&next) {
            return false;
        }
        if let Some(level) = next.commitment() {
            self.commitment_reached = Some(level);
        }
        self.state = next;
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
