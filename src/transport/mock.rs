//! Scripted peers for tests.
//!
//! [`MockPeer`] is a loopback WebSocket server standing in for a node's
//! PubSub endpoint. [`MockHttp`] answers JSON-RPC bodies through a closure
//! and counts every call.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::{Error, Result};

use super::http::HttpTransport;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on any single wait inside a test.
const MOCK_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// MockPeer
// ============================================================================

/// Loopback WebSocket server bound to a random port.
pub struct MockPeer {
    listener: TcpListener,
    port: u16,
}

impl MockPeer {
    /// Binds `127.0.0.1:0`.
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        Self { listener, port }
    }

    /// Returns `ws://127.0.0.1:{port}`.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Accepts the next client connection.
    pub async fn accept(&self) -> PeerConn {
        let (stream, _) = timeout(MOCK_TIMEOUT, self.listener.accept())
            .await
            .expect("client should connect")
            .expect("accept should succeed");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("upgrade should succeed");
        PeerConn { ws }
    }
}

/// Server side of one accepted socket.
pub struct PeerConn {
    ws: WebSocketStream<TcpStream>,
}

impl PeerConn {
    /// Reads the next text frame as JSON.
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let message = timeout(MOCK_TIMEOUT, self.ws.next())
                .await
                .expect("frame should arrive")
                .expect("stream open")
                .expect("frame ok");
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).expect("valid json");
            }
        }
    }

    /// Writes a JSON text frame.
    pub async fn send_json(&mut self, value: &Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("send should succeed");
    }

    /// Answers request `id` with `result`.
    pub async fn respond(&mut self, id: &Value, result: Value) {
        self.send_json(&json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }

    /// Answers request `id` with an error object.
    pub async fn respond_error(&mut self, id: &Value, code: i64, message: &str) {
        self.send_json(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    /// Pushes a `{method}` notification for `subscription`.
    pub async fn notify(&mut self, method: &str, subscription: u64, result: Value) {
        self.send_json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": {"subscription": subscription, "result": result}
        }))
        .await;
    }

    /// Closes the socket from the server side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

// ============================================================================
// MockHttp
// ============================================================================

/// Request as seen by a [`MockHttp`] responder.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub id: Value,
    pub method: String,
    pub params: Value,
}

type Responder = Box<dyn Fn(&MockRequest) -> Result<Value> + Send + Sync>;
type Delay = Box<dyn Fn(&MockRequest) -> Duration + Send + Sync>;

/// Call-counting [`HttpTransport`].
///
/// `Err(Error::Rpc { .. })` from the responder becomes a JSON-RPC error
/// object; any other error fails the POST itself.
pub struct MockHttp {
    responder: Responder,
    delay: Option<Delay>,
    calls: AtomicUsize,
}

impl MockHttp {
    /// Answers every request through `responder`.
    pub fn new(responder: impl Fn(&MockRequest) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every POST with a transport error.
    pub fn unreachable() -> Self {
        Self::new(|_| Err(Error::transport("unreachable")))
    }

    /// Sleeps before answering each request.
    pub fn with_delay(
        mut self,
        delay: impl Fn(&MockRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Number of POSTs received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for MockHttp {
    async fn post(&self, _url: &Url, body: String) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let value: Value = serde_json::from_str(&body)?;
        let request = MockRequest {
            id: value["id"].clone(),
            method: value["method"].as_str().unwrap_or_default().to_string(),
            params: value["params"].clone(),
        };

        if let Some(delay) = &self.delay {
            sleep(delay(&request)).await;
        }

        let response = match (self.responder)(&request) {
            Ok(result) => json!({"jsonrpc": "2.0", "id": request.id, "result": result}),
            Err(Error::Rpc { code, message }) => json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "error": {"code": code, "message": message}
            }),
            Err(e) => return Err(e),
        };

        Ok(response.to_string())
    }
}
