//! # Toolwire Client
//!
//! Uniform calling contract for invoking remote tool procedures on a locally
//! running tool server, over four interchangeable transports.
//!
//! A caller asks the [`ClientRegistry`] for a client, or builds a
//! [`Session`] around one of the persistent transports directly (or a
//! [`ProcessClient`] for the batch child-process variant). `call_tool`
//! performs connect-on-demand: it drives the session through connect and the
//! `initialize` handshake if needed, then sends `tools/call` and suspends the
//! caller until the [`Correlator`] settles the matching response or the
//! per-request deadline fires.
//!
//! ```rust,ignore
//! use toolwire_client::{ClientRegistry, RegistryConfig, ToolClient};
//! use toolwire_transport::TransportKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ClientRegistry::new(RegistryConfig::default());
//! let client = registry.client_for(TransportKind::Tcp).await?;
//! let result = client
//!     .call_tool("review_file", serde_json::json!({"file": "a.ts"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

mod client;
mod correlator;
mod error;
mod process_client;
mod registry;
mod session;

pub use client::{ClientInfo, ToolClient, ToolDescriptor};
pub use correlator::Correlator;
pub use error::{ClientError, ClientResult};
pub use process_client::ProcessClient;
pub use registry::{ClientRegistry, RegistryConfig};
pub use session::{Session, SessionState};

// Re-export the layers below for callers that configure transports directly.
pub use toolwire_protocol as protocol;
pub use toolwire_transport as transport;
pub use toolwire_transport::{
    HttpPollConfig, HttpPollTransport, ProcessPipeConfig, TcpConfig, TcpTransport, Transport,
    TransportError, TransportKind, UnixConfig, UnixTransport,
};
