//! # Toolwire Protocol
//!
//! Wire message shapes and framing codec for talking to a local tool server.
//!
//! The protocol is JSON-RPC 2.0 with integer request ids. Streaming transports
//! frame one JSON object per line; the HTTP transport posts bare JSON bodies
//! and receives pushed messages as `data: <json>` event lines. Both framings
//! are decoded incrementally by the codecs in this crate, so messages split
//! across read events are recovered correctly.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod codec;
pub mod jsonrpc;

pub use codec::{EventStreamDecoder, LineDecoder, encode_line, parse_line};
pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcVersion, Request, RequestId, Response, ResponseError, ResponsePayload,
};

/// Protocol version carried in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method name for the session handshake.
pub const METHOD_INITIALIZE: &str = "initialize";

/// Method name for invoking a remote tool.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Method name for listing the tools a server exposes.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
