//! Client error taxonomy.

use std::time::Duration;
use thiserror::Error;

use toolwire_transport::TransportError;

/// A specialized `Result` for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors surfaced to callers of the tool client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// The transport-level link failed or could not be established.
    #[error(transparent)]
    Transport(TransportError),

    /// No matching response arrived within the configured deadline.
    #[error(
        "{operation} timed out after {timeout:?} — no response from the tool server; \
         increase the request timeout if the tool is expected to be slow"
    )]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// A well-formed exchange could not be (de)serialized. Malformed inbound
    /// frames are never fatal; this covers the client's own payloads.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an `error` object; code and message are
    /// preserved verbatim.
    #[error("remote tool error {code}: {message}")]
    Remote {
        /// Numeric error code assigned by the server.
        code: i64,
        /// Server-provided message.
        message: String,
    },

    /// The operation was attempted on, or interrupted by, a session that is
    /// closing or closed.
    #[error("session is closed")]
    Closed,

    /// The `initialize` handshake failed; the session was left disconnected.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { operation, timeout } => Self::Timeout { operation, timeout },
            TransportError::Closed => Self::Closed,
            other => Self::Transport(other),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<toolwire_protocol::ResponseError> for ClientError {
    fn from(err: toolwire_protocol::ResponseError) -> Self {
        Self::Remote {
            code: err.code,
            message: err.message,
        }
    }
}
