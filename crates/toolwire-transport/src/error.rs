//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors raised by the transport layer.
///
/// Connection failures carry remediation text so the user-facing rendering is
/// actionable rather than a raw I/O error.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// An operation was attempted before `connect()` succeeded.
    #[error("not connected — call connect() before sending requests")]
    NotConnected,

    /// The transport-level link could not be established.
    #[error("connection failed: {message}. {remediation}")]
    ConnectionFailed {
        /// What went wrong.
        message: String,
        /// What the user can do about it.
        remediation: String,
    },

    /// The transport is closing or closed; outstanding work was rejected.
    #[error("transport closed while the request was outstanding")]
    Closed,

    /// A frame could not be written to the link.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A bounded operation did not finish in time. For the process pipe this
    /// also means the child process was killed.
    #[error(
        "{operation} timed out after {timeout:?} — the tool server did not answer in time; \
         increase the transport timeout if this is expected"
    )]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// The transport was configured with invalid parameters.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// Connection failure with remediation text attached.
    pub fn connection(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            remediation: remediation.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
