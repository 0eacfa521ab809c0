//! TCP socket transport.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use toolwire_protocol::Response;

use crate::duplex::spawn_duplex;
use crate::error::{TransportError, TransportResult};
use crate::traits::{Transport, TransportKind, TransportState};

/// TCP transport configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Host the tool server listens on.
    pub host: String,
    /// Port the tool server listens on.
    pub port: u16,
    /// Deadline for establishing the connection.
    pub connect_timeout: Duration,
    /// Default per-request deadline.
    pub request_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9100,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Persistent duplex TCP connection to a locally running tool server.
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    state: Arc<StdMutex<TransportState>>,
    outbound: StdMutex<Option<mpsc::Sender<String>>>,
    inbound: TokioMutex<Option<mpsc::Receiver<Response>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Create a disconnected transport for the given endpoint.
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            state: Arc::new(StdMutex::new(TransportState::Disconnected)),
            outbound: StdMutex::new(None),
            inbound: TokioMutex::new(None),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr())
    }

    fn default_request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    async fn connect(&self) -> TransportResult<()> {
        let addr = self.addr();
        info!(addr = %addr, "connecting to tcp tool server");
        *self.state.lock().expect("state mutex poisoned") = TransportState::Connecting;

        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                *self.state.lock().expect("state mutex poisoned") = TransportState::Disconnected;
                return Err(TransportError::connection(
                    format!("cannot reach {addr}: {e}"),
                    format!("no tool server is listening on {addr} — start the server first"),
                ));
            }
            Err(_) => {
                *self.state.lock().expect("state mutex poisoned") = TransportState::Disconnected;
                return Err(TransportError::connection(
                    format!(
                        "connect to {addr} timed out after {:?}",
                        self.config.connect_timeout
                    ),
                    "check that the host is reachable and the server is accepting connections"
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
        debug!(addr = %addr, "tcp transport connected");
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
        info!(endpoint = %self.endpoint(), "closing tcp transport");

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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_connect_fails_immediately() {
        let transport = TcpTransport::new(TcpConfig::default());
        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn connect_to_down_endpoint_reports_remediation() {
        let transport = TcpTransport::new(TcpConfig {
            port: 1, // nothing listens here
            ..TcpConfig::default()
        });
        let err = transport.connect().await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("start the server"), "got: {text}");
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = TcpTransport::new(TcpConfig::default());
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }
}
