//! # Toolwire Transports
//!
//! Four interchangeable ways to reach a locally running tool server:
//!
//! - [`ProcessPipe`]: spawn the server as a child process and run one
//!   newline-delimited batch over its stdio (batch-only, no background task).
//! - [`UnixTransport`]: persistent duplex connection over a Unix domain
//!   socket, one background read loop per connection.
//! - [`TcpTransport`]: the same model over a TCP socket.
//! - [`HttpPollTransport`]: independent JSON POSTs for requests plus a
//!   long-lived GET whose event stream substitutes for server push.
//!
//! The three persistent transports implement the [`Transport`] trait: the
//! session layer sends encoded request frames through [`Transport::send`] and
//! drains decoded responses from the channel handed out by
//! [`Transport::take_inbound`]. The process pipe is a batch runner with its
//! own surface because it has no receive path independent of its single
//! round-trip.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

mod duplex;
mod error;
mod http;
mod process;
mod tcp;
mod traits;
mod unix;

pub use error::{TransportError, TransportResult};
pub use http::{HttpPollConfig, HttpPollTransport, SESSION_HEADER};
pub use process::{ProcessPipe, ProcessPipeConfig};
pub use tcp::{TcpConfig, TcpTransport};
pub use traits::{Transport, TransportKind, TransportState};
pub use unix::{UnixConfig, UnixTransport};
