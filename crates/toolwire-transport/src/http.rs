//! HTTP long-poll transport.
//!
//! There is no native duplex stream over HTTP, so server push is emulated:
//! requests go out as independent JSON POSTs, and a separate long-lived GET
//! is held open by the server, streaming `data: <json>` event lines back.
//! A client-minted session id travels as a header on every call so the server
//! can pair the two legs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client as HttpClient, header};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use toolwire_protocol::{EventStreamDecoder, Response};

use crate::error::{TransportError, TransportResult};
use crate::traits::{Transport, TransportKind, TransportState};

/// Header carrying the client-minted session identifier on every call.
pub const SESSION_HEADER: &str = "X-Session-Id";

const CHANNEL_DEPTH: usize = 64;

/// HTTP long-poll transport configuration.
#[derive(Debug, Clone)]
pub struct HttpPollConfig {
    /// Base URL of the tool server, e.g. `http://127.0.0.1:8330`.
    pub base_url: String,
    /// Default per-request deadline. Network calls get the longest default.
    pub request_timeout: Duration,
    /// Deadline for the `/health` probe at connect time.
    pub health_timeout: Duration,
    /// Pause before re-opening the long-lived GET after it drops.
    pub poll_backoff: Duration,
}

impl Default for HttpPollConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8330".to_string(),
            request_timeout: Duration::from_secs(60),
            health_timeout: Duration::from_secs(5),
            poll_backoff: Duration::from_millis(500),
        }
    }
}

/// HTTP transport: POST request leg plus long-poll event leg.
#[derive(Debug)]
pub struct HttpPollTransport {
    config: HttpPollConfig,
    // No global client timeout: it would cut the long-lived GET short.
    // Per-call deadlines are set on each request builder instead.
    http: HttpClient,
    state: Arc<StdMutex<TransportState>>,
    session_id: StdMutex<Option<String>>,
    closed: Arc<AtomicBool>,
    inbound: TokioMutex<Option<mpsc::Receiver<Response>>>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

impl HttpPollTransport {
    /// Create a disconnected transport for the given base URL.
    pub fn new(config: HttpPollConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
            state: Arc::new(StdMutex::new(TransportState::Disconnected)),
            session_id: StdMutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
            inbound: TokioMutex::new(None),
            poll_task: StdMutex::new(None),
        }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base())
    }

    fn set_state(&self, state: TransportState) {
        *self.state.lock().expect("state mutex poisoned") = state;
    }

    /// Long-lived GET loop. Reopens the event stream with a short backoff
    /// every time it drops, until the session is explicitly closed or the
    /// inbound receiver goes away.
    async fn poll_loop(
        http: HttpClient,
        events_url: String,
        session_id: String,
        closed: Arc<AtomicBool>,
        state: Arc<StdMutex<TransportState>>,
        inbound_tx: mpsc::Sender<Response>,
        backoff: Duration,
    ) {
        while !closed.load(Ordering::Acquire) {
            let request = http
                .get(&events_url)
                .header(SESSION_HEADER, &session_id)
                .header(header::ACCEPT, "text/event-stream");

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %events_url, "event stream open");
                    let mut decoder = EventStreamDecoder::new();
                    let mut stream = response.bytes_stream();

                    loop {
                        match stream.next().await {
                            Some(Ok(chunk)) => {
                                for message in decoder.feed(&chunk) {
                                    if inbound_tx.send(message).await.is_err() {
                                        debug!("inbound receiver dropped, stopping poll loop");
                                        return;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                // Mid-event data is unreliable after a broken
                                // read; drop the decoder with its buffer.
                                warn!(error = %e, "event stream read failed");
                                break;
                            }
                            None => {
                                for message in decoder.finish() {
                                    if inbound_tx.send(message).await.is_err() {
                                        return;
                                    }
                                }
                                debug!("event stream ended cleanly");
                                break;
                            }
                        }
                    }
                }
                Ok(response) => {
                    warn!(status = %response.status(), "event stream request rejected");
                }
                Err(e) => {
                    warn!(error = %e, "could not open event stream");
                }
            }

            if closed.load(Ordering::Acquire) {
                break;
            }
            tokio::time::sleep(backoff).await;
        }
        *state.lock().expect("state mutex poisoned") = TransportState::Disconnected;
        debug!("long-poll loop stopped");
    }
}

#[async_trait]
impl Transport for HttpPollTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn endpoint(&self) -> String {
        self.config.base_url.clone()
    }

    fn default_request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    async fn connect(&self) -> TransportResult<()> {
        let base = self.base().to_string();
        Url::parse(&base)
            .map_err(|e| TransportError::Config(format!("invalid base URL '{base}': {e}")))?;

        info!(base = %base, "connecting to http tool server");
        self.set_state(TransportState::Connecting);

        let health_url = self.url("/health");
        let probe = self
            .http
            .get(&health_url)
            .timeout(self.config.health_timeout)
            .send()
            .await;
        match probe {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                self.set_state(TransportState::Disconnected);
                return Err(TransportError::connection(
                    format!("health check at {health_url} returned {}", response.status()),
                    "the tool server is unhealthy — restart it and check its logs".to_string(),
                ));
            }
            Err(e) => {
                self.set_state(TransportState::Disconnected);
                return Err(TransportError::connection(
                    format!("health check at {health_url} failed: {e}"),
                    format!("no tool server is reachable at {base} — start the server first"),
                ));
            }
        }

        let session_id = Uuid::new_v4().to_string();
        debug!(session_id = %session_id, "minted http session id");
        *self.session_id.lock().expect("session mutex poisoned") = Some(session_id.clone());

        self.closed.store(false, Ordering::Release);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_DEPTH);
        let task = tokio::spawn(Self::poll_loop(
            self.http.clone(),
            self.url("/events"),
            session_id,
            Arc::clone(&self.closed),
            Arc::clone(&self.state),
            inbound_tx,
            self.config.poll_backoff,
        ));

        *self.inbound.lock().await = Some(inbound_rx);
        *self.poll_task.lock().expect("poll task mutex poisoned") = Some(task);
        self.set_state(TransportState::Connected);
        Ok(())
    }

    async fn send(&self, frame: String) -> TransportResult<()> {
        let session_id = self
            .session_id
            .lock()
            .expect("session mutex poisoned")
            .clone()
            .ok_or(TransportError::NotConnected)?;
        if !self.is_connected().await {
            return Err(TransportError::NotConnected);
        }

        // The POST response body is not part of correlation; answers arrive
        // on the event stream.
        let response = self
            .http
            .post(self.url("/rpc"))
            .header(SESSION_HEADER, session_id)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(self.config.request_timeout)
            .body(frame)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::SendFailed(format!(
                "POST /rpc returned {}",
                response.status()
            )));
        }
        Ok(())
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
        info!(base = %self.config.base_url, "closing http transport");

        self.closed.store(true, Ordering::Release);
        if let Some(task) = self
            .poll_task
            .lock()
            .expect("poll task mutex poisoned")
            .take()
        {
            task.abort();
        }
        self.set_state(TransportState::Disconnected);
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
    async fn invalid_base_url_is_a_config_error() {
        let transport = HttpPollTransport::new(HttpPollConfig {
            base_url: "not a url".to_string(),
            ..HttpPollConfig::default()
        });
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_server_fails_health_check_with_remediation() {
        let transport = HttpPollTransport::new(HttpPollConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            health_timeout: Duration::from_millis(300),
            ..HttpPollConfig::default()
        });
        let err = transport.connect().await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("start the server"), "got: {text}");
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn send_before_connect_fails_immediately() {
        let transport = HttpPollTransport::new(HttpPollConfig::default());
        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = HttpPollTransport::new(HttpPollConfig::default());
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }
}
