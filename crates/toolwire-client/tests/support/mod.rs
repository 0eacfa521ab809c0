//! Mock tool servers for the integration tests.
//!
//! Each server speaks the real wire protocol on a real socket so the tests
//! exercise the full client stack: framing, correlation, timeouts and
//! lifecycle.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UnixListener};
use tokio::sync::mpsc;

use toolwire_client::protocol::Request;

/// A scripted reply: wait `delay`, then write `line`.
pub type Reply = (Duration, String);

/// Per-request behavior of a line server.
pub type Handler = dyn FnMut(Request) -> Vec<Reply> + Send;

pub fn ok_line(id: u64, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

pub fn err_line(id: u64, code: i64, message: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

pub fn now(line: String) -> Reply {
    (Duration::ZERO, line)
}

/// Opt-in log output for debugging a failing test, driven by `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Handler that answers every request with a success echoing its method.
pub fn echo_handler() -> Box<Handler> {
    Box::new(|req| vec![now(ok_line(req.id, json!({"echo": req.method})))])
}

/// Newline-delimited JSON server on a TCP socket. Accepts any number of
/// connections; the handler is shared across them.
pub async fn spawn_tcp_server(handler: Box<Handler>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(Mutex::new(handler));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_lines(stream, Arc::clone(&handler)));
        }
    });
    addr
}

/// Newline-delimited JSON server on a Unix domain socket.
pub async fn spawn_unix_server(path: &Path, handler: Box<Handler>) {
    let listener = UnixListener::bind(path).unwrap();
    let handler = Arc::new(Mutex::new(handler));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_lines(stream, Arc::clone(&handler)));
        }
    });
}

async fn serve_lines<S>(stream: S, handler: Arc<Mutex<Box<Handler>>>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(32);

    tokio::spawn(async move {
        while let Some(line) = reply_rx.recv().await {
            if write_half
                .write_all(format!("{line}\n").as_bytes())
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<Request>(&line) else {
            continue;
        };
        let replies = {
            let mut handler = handler.lock().unwrap();
            (*handler)(request)
        };
        for (delay, line) in replies {
            let tx = reply_tx.clone();
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let _ = tx.send(line).await;
            });
        }
    }
}

/// Minimal HTTP tool server: `GET /health`, `POST /rpc`, long-poll
/// `GET /events` streaming `data:` lines.
///
/// With `drop_stream_after_each_event` the events connection is closed after
/// every delivered event, forcing the client to re-open the long poll.
pub async fn spawn_http_server(drop_stream_after_each_event: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Responses produced by /rpc while no /events connection is attached are
    // queued and flushed when one shows up.
    let state: Arc<Mutex<(Option<mpsc::Sender<String>>, Vec<String>)>> =
        Arc::new(Mutex::new((None, Vec::new())));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                let _ = serve_http(stream, state, drop_stream_after_each_event).await;
            });
        }
    });
    addr
}

async fn serve_http(
    mut stream: TcpStream,
    state: Arc<Mutex<(Option<mpsc::Sender<String>>, Vec<String>)>>,
    drop_stream_after_each_event: bool,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let head_end = loop {
        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default().to_string();
    let content_length = lines
        .filter_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(str::trim).map(String::from))
        .next()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    if request_line.starts_with("GET /health") {
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
            .await?;
        return Ok(());
    }

    if request_line.starts_with("POST /rpc") {
        let mut body = buf[head_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0u8; 1024];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        if let Ok(request) = serde_json::from_slice::<Request>(&body) {
            let result = match request.method.as_str() {
                "initialize" => json!({"protocolVersion": "2024-11-05"}),
                "tools/call" => {
                    let args = request
                        .params
                        .as_ref()
                        .and_then(|p| p.get("arguments"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    json!({"success": true, "echoed": args})
                }
                _ => json!({"echo": request.method}),
            };
            let line = ok_line(request.id, result);
            let mut state = state.lock().unwrap();
            match &state.0 {
                Some(tx) => {
                    if tx.try_send(line.clone()).is_err() {
                        state.1.push(line);
                    }
                }
                None => state.1.push(line),
            }
        }
        stream
            .write_all(b"HTTP/1.1 202 Accepted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return Ok(());
    }

    if request_line.starts_with("GET /events") {
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
            )
            .await?;
        let (tx, mut rx) = mpsc::channel::<String>(32);
        let backlog = {
            let mut state = state.lock().unwrap();
            state.0 = Some(tx);
            std::mem::take(&mut state.1)
        };
        let mut backlog = backlog.into_iter();
        while let Some(line) = backlog.next() {
            stream.write_all(format!("data: {line}\n\n").as_bytes()).await?;
            if drop_stream_after_each_event {
                let mut state = state.lock().unwrap();
                state.0 = None;
                state.1.extend(backlog);
                return Ok(());
            }
        }
        while let Some(line) = rx.recv().await {
            stream.write_all(format!("data: {line}\n\n").as_bytes()).await?;
            if drop_stream_after_each_event {
                break;
            }
        }
        state.lock().unwrap().0 = None;
        return Ok(());
    }

    stream
        .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
        .await?;
    Ok(())
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
