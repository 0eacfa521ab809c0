//! Unix domain socket transport.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UnixStream;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use toolwire_protocol::Response;

use crate::duplex::spawn_duplex;
use crate::error::{TransportError, TransportResult};
use crate::traits::{Transport, TransportKind, TransportState};

/// Unix socket transport configuration.
#[derive(Debug, Clone)]
pub struct UnixConfig {
    /// Filesystem path of the server's listening socket.
    pub socket_path: PathBuf,
    /// Default per-request deadline.
    pub request_timeout: Duration,
}

impl Default for UnixConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/toolwire.sock"),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Persistent duplex connection over a Unix domain socket.
#[derive(Debug)]
pub struct UnixTransport {
    config: UnixConfig,
    state: Arc<StdMutex<TransportState>>,
    outbound: StdMutex<Option<mpsc::Sender<String>>>,
    inbound: TokioMutex<Option<mpsc::Receiver<Response>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl UnixTransport {
    /// Create a disconnected transport for the given socket path.
    pub fn new(config: UnixConfig) -> Self {
        Self {
            config,
            state: Arc::new(StdMutex::new(TransportState::Disconnected)),
            outbound: StdMutex::new(None),
            inbound: TokioMutex::new(None),
            tasks: StdMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for UnixTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Unix
    }

    fn endpoint(&self) -> String {
        format!("unix://{}", self.config.socket_path.display())
    }

    fn default_request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    async fn connect(&self) -> TransportResult<()> {
        let path = self.config.socket_path.clone();
        info!(path = %path.display(), "connecting to unix tool server");
        *self.state.lock().expect("state mutex poisoned") = TransportState::Connecting;

        if !path.exists() {
            *self.state.lock().expect("state mutex poisoned") = TransportState::Disconnected;
            return Err(TransportError::connection(
                format!("socket file {} does not exist", path.display()),
                "the tool server is not running — start it so it creates its socket".to_string(),
            ));
        }

        let stream = match UnixStream::connect(&path).await {
            Ok(stream) => stream,
            Err(e) => {
                *self.state.lock().expect("state mutex poisoned") = TransportState::Disconnected;
                return Err(TransportError::connection(
                    format!("cannot connect to {}: {e}", path.display()),
                    "the socket file exists but nothing is accepting on it — restart the tool server"
                        .to_string(),
                ));
            }
        };

        let handles = spawn_duplex(stream, self.endpoint());
        *self.outbound.lock().expect("outbound mutex poisoned") = Some(handles.outbound);
        *self.inbound.lock().await = Some(handles.inbound);
        self.tasks
            .lock()
            .expect("tasks mutex poisoned")
            .extend([handles.reader, handles.writer]);
        *self.state.lock().expect("state mutex poisoned") = TransportState::Connected;
        debug!(path = %path.display(), "unix transport connected");
        Ok(())
    }

    async fn send(&self, frame: String) -> TransportResult<()> {
        let sender = self
            .outbound
            .lock()
            .expect("outbound mutex poisoned")
            .clone()
            .ok_or(TransportError::NotConnected)?;
        sender
            .send(frame)
            .await
            .map_err(|_| TransportError::SendFailed("connection closed".to_string()))
    }

    async fn take_inbound(&self) -> TransportResult<mpsc::Receiver<Response>> {
        self.inbound
            .lock()
            .await
            .take()
            .ok_or(TransportError::NotConnected)
    }

    async fn close(&self) -> TransportResult<()> {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if *state == TransportState::Disconnected {
                return Ok(());
            }
            *state = TransportState::Closing;
        }
        info!(endpoint = %self.endpoint(), "closing unix transport");

        *self.outbound.lock().expect("outbound mutex poisoned") = None;
        for handle in self.tasks.lock().expect("tasks mutex poisoned").drain(..) {
            handle.abort();
        }
        *self.state.lock().expect("state mutex poisoned") = TransportState::Disconnected;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        *self.state.lock().expect("state mutex poisoned") == TransportState::Connected
    }
}
