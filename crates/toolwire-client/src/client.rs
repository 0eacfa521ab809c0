//! The uniform calling contract shared by all four client variants.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use toolwire_protocol::PROTOCOL_VERSION;
use toolwire_transport::TransportKind;

use crate::error::ClientResult;

/// Caller identity sent in the `initialize` handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "toolwire".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ClientInfo {
    /// Handshake parameters: protocol version, capability set, caller
    /// identity.
    pub fn initialize_params(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": self.name, "version": self.version },
        })
    }
}

/// One tool as described by the server's `tools/list` answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, as passed to `call_tool`.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for the tool's arguments.
    #[serde(default, rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// The capability set shared by all four transport variants.
///
/// `call_tool` is connect-on-demand: a client that is not yet `Ready` is
/// driven through connect and the `initialize` handshake first; an
/// already-ready client never re-runs the handshake.
#[async_trait]
pub trait ToolClient: Send + Sync + std::fmt::Debug {
    /// Which transport this client speaks.
    fn kind(&self) -> TransportKind;

    /// Establish the connection and complete the handshake.
    async fn connect(&self) -> ClientResult<()>;

    /// Send one raw request on an already-ready client and await its
    /// correlated result. Fails immediately with a not-connected error when
    /// the client is not ready, rather than hanging.
    async fn send_request(&self, method: &str, params: Option<Value>) -> ClientResult<Value>;

    /// Invoke a remote tool and await its result payload.
    async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<Value>;

    /// List the tools the server exposes.
    async fn list_tools(&self) -> ClientResult<Vec<ToolDescriptor>>;

    /// Tear the client down, rejecting every outstanding request. Idempotent;
    /// a second call is a silent no-op.
    async fn close(&self) -> ClientResult<()>;

    /// Whether the client can currently serve calls without reconnecting.
    async fn is_connected(&self) -> bool;
}

/// Extract the descriptor list from a `tools/list` result payload.
pub(crate) fn parse_tool_list(result: Value) -> ClientResult<Vec<ToolDescriptor>> {
    #[derive(Deserialize)]
    struct ToolList {
        tools: Vec<ToolDescriptor>,
    }
    let list: ToolList = serde_json::from_value(result)?;
    Ok(list.tools)
}
