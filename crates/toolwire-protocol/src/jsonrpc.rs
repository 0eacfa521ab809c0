//! JSON-RPC 2.0 message shapes.
//!
//! Requests and responses are correlated by an integer id that is unique for
//! the lifetime of one session. A response carries either a `result` or an
//! `error` object, never both; the payload enum enforces that mutual
//! exclusion at the type level.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id: unique per request within one session, echoed back in the
/// matching response.
pub type RequestId = u64;

/// JSON-RPC version marker.
///
/// Serializes as the literal string `"2.0"` and refuses to deserialize
/// anything else, so a mismatched peer fails at the parse boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// An outbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// JSON-RPC version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Correlation id.
    pub id: RequestId,
    /// Method name (`initialize`, `tools/call`, ...).
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a request for `method` with the given id and parameters.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            method: method.into(),
            params,
        }
    }
}

/// Response payload: exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Successful response.
    Success {
        /// Opaque result value; its shape belongs to the remote tool.
        result: Value,
    },
    /// Failed response.
    Failure {
        /// Remote error with code and message preserved.
        error: ResponseError,
    },
}

/// An inbound response, matched to its request by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// JSON-RPC version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Correlation id echoed from the request.
    pub id: RequestId,
    /// Result or error.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl Response {
    /// The `result` value, if this is a success response.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Success { result } => Some(result),
            ResponsePayload::Failure { .. } => None,
        }
    }

    /// The `error` object, if this is a failure response.
    pub fn error(&self) -> Option<&ResponseError> {
        match &self.payload {
            ResponsePayload::Success { .. } => None,
            ResponsePayload::Failure { error } => Some(error),
        }
    }

    /// Consume the response, yielding the result or the remote error.
    pub fn into_result(self) -> Result<Value, ResponseError> {
        match self.payload {
            ResponsePayload::Success { result } => Ok(result),
            ResponsePayload::Failure { error } => Err(error),
        }
    }
}

/// Error object carried by a failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Numeric error code assigned by the server.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
