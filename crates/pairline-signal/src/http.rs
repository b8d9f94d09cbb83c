//! Plain HTTP endpoints served on the WebSocket port
//!
//! - `GET /health` liveness and counters
//! - `GET /info` server metadata
//! - `GET /` the bundled (or configured) HTML page

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use pairline_core::{Config, MAX_ROOM_MEMBERS};

use crate::stats::ServerStats;

/// Built-in page served at `/`
const INDEX_HTML: &str = include_str!("../static/index.html");

/// Bytes inspected to tell plain HTTP from a WebSocket upgrade
const PEEK_LEN: usize = 2048;

/// How long a request head may take to arrive in full
const HEAD_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between peeks while the head is incomplete
const PEEK_RETRY: Duration = Duration::from_millis(10);

/// Everything the HTTP endpoints read
#[derive(Debug)]
pub struct HttpContext {
    stats: Arc<ServerStats>,
    static_file: Option<PathBuf>,
    heartbeat_interval_secs: u64,
}

impl HttpContext {
    pub fn new(config: &Config, stats: Arc<ServerStats>) -> Self {
        Self {
            stats,
            static_file: config.signal.static_file.clone(),
            heartbeat_interval_secs: config.heartbeat.interval().as_secs(),
        }
    }

    async fn route(&self, path: &str) -> HttpResponse {
        match path {
            "/health" => HttpResponse::json(
                "200 OK",
                json!({
                    "status": "healthy",
                    "clients": self.stats.clients(),
                    "rooms": self.stats.rooms(),
                    "uptimeSecs": self.stats.uptime().as_secs(),
                }),
            ),
            "/info" => HttpResponse::json(
                "200 OK",
                json!({
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                    "clients": self.stats.clients(),
                    "rooms": self.stats.rooms(),
                    "maxRoomSize": MAX_ROOM_MEMBERS,
                    "heartbeatIntervalSecs": self.heartbeat_interval_secs,
                }),
            ),
            "/" | "/index.html" => HttpResponse::html(self.index_page().await),
            _ => HttpResponse::json("404 Not Found", json!({ "error": "not found" })),
        }
    }

    async fn index_page(&self) -> String {
        let Some(path) = &self.static_file else {
            return INDEX_HTML.to_string();
        };

        match tokio::fs::read_to_string(path).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to read {:?}: {}, serving built-in page", path, e);
                INDEX_HTML.to_string()
            }
        }
    }
}

struct HttpResponse {
    status: &'static str,
    content_type: &'static str,
    body: String,
}

impl HttpResponse {
    fn json(status: &'static str, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    fn html(body: String) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.content_type,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}

/// Peek at the request head: true for a `GET` that is not a WebSocket upgrade.
///
/// The head may arrive over several segments, so this waits until it ends
/// (blank line), fills the peek buffer, or [`HEAD_TIMEOUT`] passes.
pub async fn is_plain_http(stream: &TcpStream) -> std::io::Result<bool> {
    let mut buf = [0u8; PEEK_LEN];
    let deadline = tokio::time::Instant::now() + HEAD_TIMEOUT;

    loop {
        let n = stream.peek(&mut buf).await?;
        let head = &buf[..n];
        if n == 0
            || n == PEEK_LEN
            || !could_be_get(head)
            || head_complete(head)
            || tokio::time::Instant::now() >= deadline
        {
            return Ok(is_plain_get(head));
        }
        tokio::time::sleep(PEEK_RETRY).await;
    }
}

/// False once the bytes seen so far cannot start a `GET` request
fn could_be_get(head: &[u8]) -> bool {
    let len = head.len().min(4);
    head[..len].eq_ignore_ascii_case(&b"GET "[..len])
}

fn head_complete(head: &[u8]) -> bool {
    head.windows(4).any(|w| w == b"\r\n\r\n")
}

fn is_plain_get(head: &[u8]) -> bool {
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    if !head.starts_with("get ") {
        return false;
    }

    !head.lines().any(|line| {
        line.strip_prefix("upgrade:")
            .map(|value| value.contains("websocket"))
            .unwrap_or(false)
    })
}

/// Answer a single HTTP request and close the stream
pub async fn respond(stream: &mut TcpStream, ctx: &HttpContext) -> std::io::Result<()> {
    let mut buf = vec![0u8; PEEK_LEN];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");
    let path = path.split('?').next().unwrap_or(path);
    debug!("HTTP GET {}", path);

    let response = ctx.route(path).await;
    stream.write_all(&response.into_bytes()).await?;
    stream.shutdown().await
}
