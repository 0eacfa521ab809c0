//! Session lifecycle on top of a persistent transport.
//!
//! One [`Session`] owns one transport link, one [`Correlator`], and one pump
//! task forwarding the transport's inbound channel into the correlator. The
//! state machine is `Disconnected → Connecting → Initializing → Ready →
//! Closing → Disconnected`; any unrecoverable transport failure also lands in
//! `Disconnected`, rejecting every remaining pending entry on the way.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use toolwire_protocol::{METHOD_INITIALIZE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, Request};
use toolwire_transport::{Transport, TransportError, TransportKind};

use crate::client::{ClientInfo, ToolClient, ToolDescriptor, parse_tool_list};
use crate::correlator::Correlator;
use crate::error::{ClientError, ClientResult};

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Transport link being established.
    Connecting,
    /// Link live, handshake in flight.
    Initializing,
    /// Handshake succeeded; calls can flow.
    Ready,
    /// Teardown in progress.
    Closing,
}

/// A stateful connection to one tool server over a persistent transport.
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: Arc<T>,
    correlator: Arc<Correlator>,
    state: Arc<StdMutex<SessionState>>,
    client_info: ClientInfo,
    request_timeout: Duration,
    pump: StdMutex<Option<JoinHandle<()>>>,
    // Serializes connect attempts so concurrent connect-on-demand callers
    // drive exactly one handshake.
    connect_gate: TokioMutex<()>,
}

impl<T: Transport + 'static> Session<T> {
    /// Wrap a transport with the default caller identity and the transport's
    /// default request timeout.
    pub fn new(transport: T) -> Self {
        Self::with_client_info(transport, ClientInfo::default())
    }

    /// Wrap a transport with an explicit caller identity.
    pub fn with_client_info(transport: T, client_info: ClientInfo) -> Self {
        let request_timeout = transport.default_request_timeout();
        Self {
            transport: Arc::new(transport),
            correlator: Arc::new(Correlator::new()),
            state: Arc::new(StdMutex::new(SessionState::Disconnected)),
            client_info,
            request_timeout,
            pump: StdMutex::new(None),
            connect_gate: TokioMutex::new(()),
        }
    }

    /// Override the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("state mutex poisoned")
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("state mutex poisoned") = state;
    }

    /// Drive the session to `Ready` if it is not there already. Never re-runs
    /// the handshake on a ready session.
    async fn ensure_ready(&self) -> ClientResult<()> {
        let _gate = self.connect_gate.lock().await;
        if self.state() == SessionState::Ready {
            return Ok(());
        }
        self.establish().await
    }

    async fn establish(&self) -> ClientResult<()> {
        info!(endpoint = %self.transport.endpoint(), "establishing session");
        self.set_state(SessionState::Connecting);

        if let Err(e) = self.transport.connect().await {
            self.set_state(SessionState::Disconnected);
            return Err(e.into());
        }
        let mut inbound = match self.transport.take_inbound().await {
            Ok(inbound) => inbound,
            Err(e) => {
                self.set_state(SessionState::Disconnected);
                return Err(e.into());
            }
        };

        // Pump: the single consumer of the transport's inbound channel. When
        // the channel closes (connection loss or teardown) every remaining
        // pending entry is rejected and the session is marked disconnected.
        let correlator = Arc::clone(&self.correlator);
        let state = Arc::clone(&self.state);
        let endpoint = self.transport.endpoint();
        let pump = tokio::spawn(async move {
            while let Some(response) = inbound.recv().await {
                correlator.settle(response);
            }
            let rejected = correlator.fail_all();
            if rejected > 0 {
                warn!(endpoint = %endpoint, rejected, "connection lost with requests in flight");
            }
            let mut state = state.lock().expect("state mutex poisoned");
            if *state != SessionState::Closing {
                *state = SessionState::Disconnected;
            }
        });
        *self.pump.lock().expect("pump mutex poisoned") = Some(pump);

        self.set_state(SessionState::Initializing);
        let params = self.client_info.initialize_params();
        match self.raw_request(METHOD_INITIALIZE, Some(params)).await {
            Ok(result) => {
                debug!(endpoint = %self.transport.endpoint(), ?result, "handshake complete");
                self.set_state(SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                // A handshake error must never leave the session looking
                // ready; tear the link down and surface the failure.
                let _ = self.transport.close().await;
                self.abort_pump();
                self.correlator.fail_all();
                self.set_state(SessionState::Disconnected);
                Err(match e {
                    ClientError::Remote { code, message } => {
                        ClientError::Handshake(format!("{message} (code {code})"))
                    }
                    other => other,
                })
            }
        }
    }

    /// Register a pending entry, send the request, and await settlement under
    /// the per-request deadline. Registration happens before the send so the
    /// pump can route a fast response that arrives while the send call is
    /// still returning.
    async fn raw_request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        let (id, receiver) = self.correlator.register();
        let request = Request::new(id, method, params);
        let frame = serde_json::to_string(&request)?;

        if let Err(e) = self.transport.send(frame).await {
            self.correlator.abort(id);
            return Err(e.into());
        }

        match timeout(self.request_timeout, receiver).await {
            Ok(Ok(response)) => Ok(response.into_result()?),
            // The pending table was drained under us: session teardown.
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                // Deadline fired first: remove the entry so a late response
                // is discarded instead of settling a phantom waiter.
                self.correlator.abort(id);
                Err(ClientError::Timeout {
                    operation: method.to_string(),
                    timeout: self.request_timeout,
                })
            }
        }
    }

    fn abort_pump(&self) {
        if let Some(pump) = self.pump.lock().expect("pump mutex poisoned").take() {
            pump.abort();
        }
    }
}

#[async_trait]
impl<T: Transport + 'static> ToolClient for Session<T> {
    fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    async fn connect(&self) -> ClientResult<()> {
        self.ensure_ready().await
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        match self.state() {
            SessionState::Ready => self.raw_request(method, params).await,
            SessionState::Closing => Err(ClientError::Closed),
            _ => Err(ClientError::Transport(TransportError::NotConnected)),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<Value> {
        self.ensure_ready().await?;
        self.raw_request(
            METHOD_TOOLS_CALL,
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    async fn list_tools(&self) -> ClientResult<Vec<ToolDescriptor>> {
        self.ensure_ready().await?;
        let result = self.raw_request(METHOD_TOOLS_LIST, None).await?;
        parse_tool_list(result)
    }

    async fn close(&self) -> ClientResult<()> {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if matches!(*state, SessionState::Disconnected | SessionState::Closing) {
                return Ok(());
            }
            *state = SessionState::Closing;
        }
        info!(endpoint = %self.transport.endpoint(), "closing session");

        self.transport.close().await?;
        self.abort_pump();
        let rejected = self.correlator.fail_all();
        if rejected > 0 {
            debug!(rejected, "rejected outstanding requests at close");
        }
        self.set_state(SessionState::Disconnected);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state() == SessionState::Ready && self.transport.is_connected().await
    }
}
