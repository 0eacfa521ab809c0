//! Shared read/write plumbing for the socket transports.
//!
//! Both socket transports speak newline-delimited JSON over one persistent
//! duplex stream. The stream is framed with `LinesCodec` and split: a writer
//! task drains an outgoing channel into the sink, a reader task decodes
//! inbound lines and forwards parsed responses to the inbound channel. Writes
//! interleave freely with reads; neither task ever blocks the caller.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

use toolwire_protocol::{Response, codec};

const CHANNEL_DEPTH: usize = 64;

pub(crate) struct DuplexHandles {
    pub(crate) outbound: mpsc::Sender<String>,
    pub(crate) inbound: mpsc::Receiver<Response>,
    pub(crate) reader: JoinHandle<()>,
    pub(crate) writer: JoinHandle<()>,
}

/// Split `stream` into independent read and write tasks.
///
/// The reader task owns the inbound sender: when the connection ends for any
/// reason (EOF, read error, abort) the sender drops and the inbound channel
/// closes, which the session layer observes as connection loss. Malformed
/// lines are skipped with a warning and never end the connection.
pub(crate) fn spawn_duplex<S>(stream: S, endpoint: String) -> DuplexHandles
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let framed = Framed::new(stream, LinesCodec::new());
    let (mut sink, mut lines) = framed.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(CHANNEL_DEPTH);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Response>(CHANNEL_DEPTH);

    let writer_endpoint = endpoint.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                warn!(endpoint = %writer_endpoint, error = %e, "write failed, stopping writer");
                break;
            }
        }
        debug!(endpoint = %writer_endpoint, "writer task finished");
    });

    let reader = tokio::spawn(async move {
        while let Some(result) = lines.next().await {
            match result {
                Ok(line) => {
                    let Some(message) = codec::parse_line(&line) else {
                        continue;
                    };
                    if inbound_tx.send(message).await.is_err() {
                        debug!(endpoint = %endpoint, "inbound receiver dropped, stopping reader");
                        return;
                    }
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "read failed, closing connection");
                    break;
                }
            }
        }
        debug!(endpoint = %endpoint, "reader task finished");
        // inbound_tx drops here; the session sees the channel close
    });

    DuplexHandles {
        outbound: outbound_tx,
        inbound: inbound_rx,
        reader,
        writer,
    }
}
