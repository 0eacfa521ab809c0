//! Batch client over the spawned child-process transport.
//!
//! There is no persistent link: every invocation queues its requests through
//! the correlator, runs one batch round-trip (handshake plus call in the same
//! process run), settles the returned responses by id, and resolves the
//! waiters. Exceeding the batch deadline kills the process and fails every
//! request that was part of the batch.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::debug;

use toolwire_protocol::{
    METHOD_INITIALIZE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, Request, RequestId, Response,
};
use toolwire_transport::{ProcessPipe, ProcessPipeConfig, TransportKind};

use crate::client::{ClientInfo, ToolClient, ToolDescriptor, parse_tool_list};
use crate::correlator::Correlator;
use crate::error::{ClientError, ClientResult};

/// Tool client backed by one child-process batch per invocation.
#[derive(Debug)]
pub struct ProcessClient {
    pipe: ProcessPipe,
    correlator: Correlator,
    client_info: ClientInfo,
    connected: AtomicBool,
}

impl ProcessClient {
    /// Create a client for the configured executable.
    pub fn new(config: ProcessPipeConfig) -> Self {
        Self::with_client_info(config, ClientInfo::default())
    }

    /// Create a client with an explicit caller identity.
    pub fn with_client_info(config: ProcessPipeConfig, client_info: ClientInfo) -> Self {
        Self {
            pipe: ProcessPipe::new(config),
            correlator: Correlator::new(),
            client_info,
            connected: AtomicBool::new(false),
        }
    }

    /// Queue a request for the next batch.
    fn queue(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> (Request, RequestId, oneshot::Receiver<Response>) {
        let (id, receiver) = self.correlator.register();
        (Request::new(id, method, params), id, receiver)
    }

    /// Run one batch and settle its responses through the correlator.
    ///
    /// On failure every queued id is removed so the table never accumulates
    /// entries across batches.
    async fn run(&self, requests: &[Request], ids: &[RequestId]) -> ClientResult<()> {
        let result = self.pipe.run_batch(requests).await;
        match result {
            Ok(responses) => {
                debug!(
                    sent = requests.len(),
                    received = responses.len(),
                    "batch settled"
                );
                for response in responses {
                    self.correlator.settle(response);
                }
                for id in ids {
                    self.correlator.abort(*id);
                }
                Ok(())
            }
            Err(e) => {
                for id in ids {
                    self.correlator.abort(*id);
                }
                Err(e.into())
            }
        }
    }

    /// Resolve one waiter after the batch ran. A request the server never
    /// answered is a protocol error, not a hang.
    fn resolve(
        &self,
        id: RequestId,
        mut receiver: oneshot::Receiver<Response>,
    ) -> ClientResult<Value> {
        match receiver.try_recv() {
            Ok(response) => Ok(response.into_result()?),
            Err(_) => Err(ClientError::Protocol(format!(
                "server returned no response for request {id}"
            ))),
        }
    }

    fn ensure_connected(&self) -> ClientResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClientError::Transport(
                toolwire_transport::TransportError::NotConnected,
            ))
        }
    }

    /// Run `initialize` plus one payload request in a single batch and
    /// resolve the payload result.
    async fn batched_call(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        self.ensure_connected()?;

        let (init_req, init_id, init_rx) =
            self.queue(METHOD_INITIALIZE, Some(self.client_info.initialize_params()));
        let (call_req, call_id, call_rx) = self.queue(method, params);

        self.run(&[init_req, call_req], &[init_id, call_id]).await?;

        // The handshake answer gates the call answer: an initialize error
        // means the server rejected the whole session.
        if let Err(e) = self.resolve(init_id, init_rx) {
            return Err(match e {
                ClientError::Remote { code, message } => {
                    ClientError::Handshake(format!("{message} (code {code})"))
                }
                other => other,
            });
        }
        self.resolve(call_id, call_rx)
    }
}

#[async_trait]
impl ToolClient for ProcessClient {
    fn kind(&self) -> TransportKind {
        TransportKind::Process
    }

    async fn connect(&self) -> ClientResult<()> {
        self.pipe.verify_command()?;
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        self.ensure_connected()?;
        // A standalone request is its own single-entry batch; the process is
        // spawned for it and cannot be reused afterwards.
        let (request, id, receiver) = self.queue(method, params);
        self.run(&[request], &[id]).await?;
        self.resolve(id, receiver)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<Value> {
        self.batched_call(
            METHOD_TOOLS_CALL,
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    async fn list_tools(&self) -> ClientResult<Vec<ToolDescriptor>> {
        let result = self.batched_call(METHOD_TOOLS_LIST, None).await?;
        parse_tool_list(result)
    }

    async fn close(&self) -> ClientResult<()> {
        // Nothing persistent to tear down; reject anything still queued.
        self.connected.store(false, Ordering::Release);
        self.correlator.fail_all();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
