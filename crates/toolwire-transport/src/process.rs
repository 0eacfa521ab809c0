//! Child-process batch transport.
//!
//! The tool server is spawned as a child process; every queued request is
//! written to its stdin up front, stdin is closed, and the process is awaited
//! (bounded by a hard timeout) before its captured stdout is parsed as a
//! batch of newline-delimited responses.
//!
//! This transport is batch-only: once the process is spawned and its input
//! closed there is no way to send another request. A revision giving it the
//! persistent model of the other transports was considered and rejected; the
//! single-shot use case does not justify the cost.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use toolwire_protocol::{LineDecoder, Request, codec};

use crate::error::{TransportError, TransportResult};

/// Child-process transport configuration.
#[derive(Debug, Clone)]
pub struct ProcessPipeConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments to pass.
    pub args: Vec<String>,
    /// Working directory for the child, if different from ours.
    pub working_directory: Option<PathBuf>,
    /// Hard bound on the whole batch round-trip. Exceeding it kills the
    /// process; there is no narrower cancellation unit available.
    pub batch_timeout: Duration,
}

impl Default for ProcessPipeConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            working_directory: None,
            batch_timeout: Duration::from_secs(10),
        }
    }
}

/// One-shot batch runner over a spawned tool server process.
#[derive(Debug)]
pub struct ProcessPipe {
    config: ProcessPipeConfig,
}

impl ProcessPipe {
    /// Create a runner for the configured executable.
    pub fn new(config: ProcessPipeConfig) -> Self {
        Self { config }
    }

    /// Human-readable endpoint for logs and errors.
    pub fn endpoint(&self) -> String {
        format!("process://{}", self.config.command)
    }

    /// The batch deadline, which doubles as the per-request deadline since
    /// the whole batch is one round-trip.
    pub fn batch_timeout(&self) -> Duration {
        self.config.batch_timeout
    }

    /// Check that the configured executable can plausibly be spawned.
    ///
    /// Commands given as paths are checked on the filesystem; bare names are
    /// left to the PATH lookup at spawn time.
    pub fn verify_command(&self) -> TransportResult<()> {
        if self.config.command.is_empty() {
            return Err(TransportError::Config(
                "process transport needs a command to spawn".to_string(),
            ));
        }
        let path = PathBuf::from(&self.config.command);
        if self.config.command.contains('/') && !path.exists() {
            return Err(TransportError::connection(
                format!("executable {} does not exist", path.display()),
                "install the tool server or fix the configured path".to_string(),
            ));
        }
        Ok(())
    }

    /// Run one batch: spawn, write every request, close stdin, await exit,
    /// parse stdout. On timeout the child is killed and the whole batch fails.
    pub async fn run_batch(
        &self,
        requests: &[Request],
    ) -> TransportResult<Vec<toolwire_protocol::Response>> {
        self.verify_command()?;

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_directory {
            command.current_dir(dir);
        }

        debug!(command = %self.config.command, requests = requests.len(), "spawning batch process");
        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransportError::connection(
                    format!("executable '{}' not found", self.config.command),
                    "install the tool server or fix the configured path".to_string(),
                )
            } else {
                TransportError::Io(e.to_string())
            }
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io("child stdin was not piped".to_string()))?;
        for request in requests {
            let line = codec::encode_line(request)
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            stdin.write_all(line.as_bytes()).await?;
        }
        stdin.shutdown().await?;
        drop(stdin);

        // kill_on_drop reclaims the process if the deadline fires: dropping
        // the timed-out future drops the child handle, which kills it.
        let output = match timeout(self.config.batch_timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    command = %self.config.command,
                    timeout = ?self.config.batch_timeout,
                    "batch process exceeded its deadline, killing it"
                );
                return Err(TransportError::Timeout {
                    operation: format!("batch against {}", self.endpoint()),
                    timeout: self.config.batch_timeout,
                });
            }
        };

        if !output.status.success() {
            warn!(
                command = %self.config.command,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "batch process exited with failure status"
            );
        }

        let mut decoder = LineDecoder::new();
        let mut responses = decoder.feed(&output.stdout);
        responses.extend(decoder.finish());
        debug!(responses = responses.len(), "batch process finished");
        Ok(responses)
    }
}
