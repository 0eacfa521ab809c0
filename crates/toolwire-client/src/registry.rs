//! Process-wide client cache, one ready client per transport kind.
//!
//! The registry is an explicit instance so tests can construct their own; a
//! [`ClientRegistry::global`] accessor exists for the embedding application.
//! Staleness is defined solely by `is_connected()`, never by elapsed time or
//! call count, and a stale reference is discarded without a graceful close so
//! the caller is never blocked on a possibly-hung connection.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::{debug, info};

use toolwire_transport::{
    HttpPollConfig, HttpPollTransport, ProcessPipeConfig, TcpConfig, TcpTransport, TransportKind,
    UnixConfig, UnixTransport,
};

use crate::client::{ClientInfo, ToolClient};
use crate::error::ClientResult;
use crate::process_client::ProcessClient;
use crate::session::Session;

/// Endpoint configuration for every transport kind the registry can build.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Child-process endpoint (executable path and arguments).
    pub process: ProcessPipeConfig,
    /// Unix domain socket endpoint.
    pub unix: UnixConfig,
    /// TCP endpoint.
    pub tcp: TcpConfig,
    /// HTTP long-poll endpoint.
    pub http: HttpPollConfig,
    /// Caller identity used in every handshake.
    pub client_info: ClientInfo,
}

/// Cache of one ready client per transport kind, created lazily.
#[derive(Debug)]
pub struct ClientRegistry {
    config: RegistryConfig,
    clients: Mutex<HashMap<TransportKind, Arc<dyn ToolClient>>>,
}

impl ClientRegistry {
    /// Create a registry for the given endpoints.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry, built from default endpoint configuration.
    ///
    /// Prefer passing a registry instance explicitly where testability
    /// matters; this accessor exists for the application entry points.
    pub fn global() -> &'static ClientRegistry {
        static GLOBAL: OnceLock<ClientRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| ClientRegistry::new(RegistryConfig::default()))
    }

    /// Return a ready client for `kind`, reusing the cached one when it is
    /// still connected and otherwise building, connecting and caching a fresh
    /// one. Requests that were in flight on a discarded stale client are
    /// rejected by that client's own teardown, never replayed.
    ///
    /// The cache lock is not held while connecting, so a slow endpoint for
    /// one transport kind cannot stall lookups for the others.
    pub async fn client_for(&self, kind: TransportKind) -> ClientResult<Arc<dyn ToolClient>> {
        {
            let mut clients = self.clients.lock().await;
            if let Some(existing) = clients.get(&kind) {
                if existing.is_connected().await {
                    debug!(%kind, "reusing cached client");
                    return Ok(Arc::clone(existing));
                }
                // Stale: drop the reference without a graceful close.
                info!(%kind, "cached client is stale, discarding");
                clients.remove(&kind);
            }
        }

        info!(%kind, "creating client");
        let client = self.build(kind);
        client.connect().await?;

        let mut clients = self.clients.lock().await;
        if let Some(existing) = clients.get(&kind) {
            if existing.is_connected().await {
                // A concurrent lookup connected first; keep its client.
                debug!(%kind, "concurrent connect won, discarding ours");
                let _ = client.close().await;
                return Ok(Arc::clone(existing));
            }
        }
        clients.insert(kind, Arc::clone(&client));
        Ok(client)
    }

    fn build(&self, kind: TransportKind) -> Arc<dyn ToolClient> {
        let info = self.config.client_info.clone();
        match kind {
            TransportKind::Process => Arc::new(ProcessClient::with_client_info(
                self.config.process.clone(),
                info,
            )),
            TransportKind::Unix => Arc::new(Session::with_client_info(
                UnixTransport::new(self.config.unix.clone()),
                info,
            )),
            TransportKind::Tcp => Arc::new(Session::with_client_info(
                TcpTransport::new(self.config.tcp.clone()),
                info,
            )),
            TransportKind::Http => Arc::new(Session::with_client_info(
                HttpPollTransport::new(self.config.http.clone()),
                info,
            )),
        }
    }

    /// Close every cached client and empty the cache.
    pub async fn close_all(&self) {
        let mut clients = self.clients.lock().await;
        for (kind, client) in clients.drain() {
            debug!(%kind, "closing cached client");
            let _ = client.close().await;
        }
    }
}
