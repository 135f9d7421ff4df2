//! Push notification messages.
//!
//! Notifications are sent by the node for every live subscription.
//!
//! # Format
//!
//! ```json
//! {
//!   "jsonrpc": "2.0",
//!   "method": "accountNotification",
//!   "params": { "subscription": 23784, "result": { "context": { "slot": 5 }, "value": { .. } } }
//! }
//! ```
//!
//! # Payloads
//!
//! | Method | Payload |
//! |--------|---------|
//! | `accountNotification` | [`AccountInfo`] |
//! | `programNotification` | [`KeyedAccount`] |
//! | `signatureNotification` | [`SignatureOutcome`] |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;

use super::method::SubscriptionKind;
use super::types::{AccountInfo, KeyedAccount, RpcContext};

// ============================================================================
// Notification
// ============================================================================

/// A decoded push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Subscription the notification belongs to.
    pub subscription: SubscriptionId,
    /// Slot at which the change was observed.
    pub slot: u64,
    /// Method-specific payload.
    pub payload: NotificationPayload,
}

/// Typed notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPayload {
    /// Account changed.
    Account(AccountInfo),
    /// Account owned by the watched program changed.
    Program(KeyedAccount),
    /// Signature reached the subscribed commitment, or was received.
    Signature(SignatureOutcome),
}

/// Outcome carried by a signature notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// The node received the transaction (only with `enableReceivedNotification`).
    Received,
    /// The transaction reached the subscribed commitment.
    Processed {
        /// Execution error, `None` on success.
        err: Option<String>,
    },
}

#[derive(Deserialize)]
struct RawNotification {
    method: String,
    params: RawParams,
}

#[derive(Deserialize)]
struct RawParams {
    subscription: SubscriptionId,
    result: RawResult,
}

#[derive(Deserialize)]
struct RawResult {
    context: RpcContext,
    value: Value,
}

impl Notification {
    /// Returns the kind of subscription that produced this notification.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> SubscriptionKind {
        match self.payload {
            NotificationPayload::Account(_) => SubscriptionKind::Account,
            NotificationPayload::Program(_) => SubscriptionKind::Program,
            NotificationPayload::Signature(_) => SubscriptionKind::Signature,
        }
    }

    /// Decodes a notification frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unknown methods or malformed payloads.
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawNotification = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("malformed notification: {e}")))?;

        let kind = SubscriptionKind::from_notification_method(&raw.method)
            .ok_or_else(|| Error::protocol(format!("unsupported notification '{}'", raw.method)))?;

        let RawResult { context, value } = raw.params.result;

        let payload = match kind {
            SubscriptionKind::Account => NotificationPayload::Account(AccountInfo::from_value(value)?),
            SubscriptionKind::Program => NotificationPayload::Program(KeyedAccount::from_value(value)?),
            SubscriptionKind::Signature => {
                NotificationPayload::Signature(decode_signature_outcome(&value)?)
            }
        };

        Ok(Self {
            subscription: raw.params.subscription,
            slot: context.slot,
            payload,
        })
    }
}

fn decode_signature_outcome(value: &Value) -> Result<SignatureOutcome> {
    if value.as_str() == Some("receivedSignature") {
        return Ok(SignatureOutcome::Received);
    }

    let err = value
        .as_object()
        .ok_or_else(|| Error::protocol(format!("unexpected signature result: {value}")))?
        .get("err")
        .filter(|e| !e.is_null())
        .map(Value::to_string);

    Ok(SignatureOutcome::Processed { err })
}

// ============================================================================
// Tests
// ============================================================================
