//! Test doubles for the backend seam.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::backend::{ChatBackend, LineStream};
use crate::error::ProxyError;
use crate::types::Message;

/// Backend double replaying canned payload lines.
pub struct MockBackend {
    lines: Vec<String>,
    error: Mutex<Option<ProxyError>>,
    call_count: AtomicUsize,
    last_request: Mutex<Option<(String, Vec<Message>)>>,
}

impl MockBackend {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            error: Mutex::new(None),
            call_count: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_error(self, error: ProxyError) -> Self {
        *self.error.lock().unwrap() = Some(error);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Model and messages of the most recent call.
    pub fn last_request(&self) -> Option<(String, Vec<Message>)> {
        self.last_request.lock().unwrap().clone()
    }
}

impl ChatBackend for MockBackend {
    fn stream_chat(&self, messages: Vec<Message>, model: &str) -> Result<LineStream, ProxyError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((model.to_string(), messages));

        // ProxyError is not Clone, so error mode is single-use
        if let Some(err) = self.error.lock().unwrap().take() {
            return Err(err);
        }

        Ok(Box::pin(stream::iter(self.lines.clone())))
    }
}

/// One scripted reply of a [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// 200 with the full body, then the connection closes.
    Complete(String),
    /// 200 advertising more bytes than `body`; the connection closes after
    /// `body`, so the client sees a broken stream.
    Truncated(String),
}

/// Raw HTTP/1.1 chat endpoint answering connection `n` with reply `n`. Once
/// the script runs out the last reply repeats.
pub struct ScriptedBackend {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub async fn start(script: Vec<ScriptedReply>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let Some(reply) = script.get(n).or(script.last()).cloned() else {
                    continue;
                };
                tokio::spawn(async move {
                    if read_request(&mut socket).await.is_ok() {
                        let _ = socket.write_all(reply.to_http().as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                });
            }
        });

        Ok(Self { addr, connections })
    }

    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl ScriptedReply {
    fn to_http(&self) -> String {
        let (body, advertised) = match self {
            Self::Complete(body) => (body, body.len()),
            Self::Truncated(body) => (body, body.len() + 512),
        };
        format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            advertised, body
        )
    }
}

/// Consume one request head and its `content-length` body.
async fn read_request(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + body_len {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}
