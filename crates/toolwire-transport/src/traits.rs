//! The transport trait shared by the persistent transports.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use toolwire_protocol::Response;

use crate::error::TransportResult;

/// Which of the four transport variants a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Spawned child process, stdio batch round-trip.
    Process,
    /// Unix domain socket.
    Unix,
    /// TCP socket.
    Tcp,
    /// HTTP POST plus long-poll GET.
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Unix => write!(f, "unix"),
            Self::Tcp => write!(f, "tcp"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Lifecycle state of one transport-level link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransportState {
    /// No link.
    #[default]
    Disconnected,
    /// Link being established.
    Connecting,
    /// Link live; frames can flow.
    Connected,
    /// Teardown in progress.
    Closing,
}

/// Wire-level surface of a persistent transport (unix, tcp, http-poll).
///
/// One connected transport owns one background read path that decodes inbound
/// bytes into [`Response`] messages and feeds them to the channel handed out
/// by [`take_inbound`](Transport::take_inbound); the session layer pumps that
/// channel into its correlator. The read path never blocks senders, and when
/// it ends (close, EOF, unrecoverable error) the channel closes, which the
/// session observes as connection loss.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Which variant this is.
    fn kind(&self) -> TransportKind;

    /// Human-readable endpoint address for logs and errors.
    fn endpoint(&self) -> String;

    /// Per-request deadline to apply when the caller does not override it.
    fn default_request_timeout(&self) -> Duration;

    /// Establish the transport-level link and start the read loop.
    async fn connect(&self) -> TransportResult<()>;

    /// Send one encoded request frame (bare JSON text, framing is the
    /// transport's business). Fails with `NotConnected` before `connect()`.
    async fn send(&self, frame: String) -> TransportResult<()>;

    /// Hand the inbound message channel to the session layer. Yields the
    /// receiver exactly once per successful `connect()`.
    async fn take_inbound(&self) -> TransportResult<mpsc::Receiver<Response>>;

    /// Tear the link down. Idempotent; a second call is a no-op.
    async fn close(&self) -> TransportResult<()>;

    /// Whether the link is currently live.
    async fn is_connected(&self) -> bool;
}
