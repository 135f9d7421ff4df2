//! JSON-RPC 2.0 request and response envelopes.
//!
//! # Format
//!
//! Request:
//! ```json
//! { "jsonrpc": "2.0", "id": 1, "method": "getBalance", "params": ["..."] }
//! ```
//!
//! Success:
//! ```json
//! { "jsonrpc": "2.0", "id": 1, "result": { "context": { "slot": 1 }, "value": 0 } }
//! ```
//!
//! Error:
//! ```json
//! { "jsonrpc": "2.0", "id": 1, "error": { "code": -32602, "message": "Invalid params" } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::method::RpcMethod;
use super::notification::Notification;

// ============================================================================
// Constants
// ============================================================================

/// Protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// RpcRequest
// ============================================================================

/// An outgoing JSON-RPC request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Correlation id.
    pub id: RequestId,
    /// Method name.
    pub method: &'static str,
    /// Positional parameters.
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Encodes a typed method under the given id.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, method: &RpcMethod) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.name(),
            params: method.params(),
        }
    }

    /// Serializes the request to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    #[inline]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// RpcResponse
// ============================================================================

/// JSON-RPC error object returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcErrorObject {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Option<Value>,
}

/// An incoming JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Matches the request `id`; `None` when the node could not parse the request.
    #[serde(default)]
    pub id: Option<RequestId>,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error object (if error).
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, mirroring the peer's error object on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the response carried an error object.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::rpc(error.code, error.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Parses an HTTP response body holding either one response or a batch.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the body is not a JSON-RPC response.
pub fn parse_responses(body: &str) -> Result<Vec<RpcResponse>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::protocol(format!("response is not JSON: {e}")))?;

    let decode = |v: Value| {
        serde_json::from_value::<RpcResponse>(v)
            .map_err(|e| Error::protocol(format!("malformed response: {e}")))
    };

    match value {
        Value::Array(items) => items.into_iter().map(decode).collect(),
        single => decode(single).map(|r| vec![r]),
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// A text frame read from the WebSocket, classified.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Reply to a request sent on the socket.
    Response(RpcResponse),
    /// Push notification for a live subscription.
    Notification(Notification),
}

impl InboundFrame {
    /// Classifies a text frame.
    ///
    /// Frames with a `method` field are notifications; anything else with an
    /// `id`, `result` or `error` is a response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is neither.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("frame is not JSON: {e}")))?;

        if value.get("method").is_some() {
            return Notification::from_value(value).map(Self::Notification);
        }

        if value.get("id").is_some() || value.get("result").is_some() || value.get("error").is_some()
        {
            let response = serde_json::from_value(value)
                .map_err(|e| Error::protocol(format!("malformed response: {e}")))?;
            return Ok(Self::Response(response));
        }

        Err(Error::protocol("frame is neither a response nor a notification"))
    }
}

// ============================================================================
// Tests
// ============================================================================
