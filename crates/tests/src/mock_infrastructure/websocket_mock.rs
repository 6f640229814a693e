//! Scripted WebSocket JSON-RPC node.
//!
//! Each text frame is parsed as a JSON-RPC request and, unless the server is
//! silent, answered with `{"jsonrpc":"2.0","id":<request id>,"result":<request params>}`.
//! Echoing the params lets tests tell concurrent calls apart after the gateway has
//! rewritten their ids.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, RwLock},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Default)]
struct SharedState {
    silent: AtomicBool,
    connections: AtomicUsize,
    received: RwLock<Vec<String>>,
}

pub struct MockWebSocketServer {
    addr: SocketAddr,
    state: Arc<SharedState>,
    server_handle: JoinHandle<()>,
    disconnect_tx: broadcast::Sender<()>,
}

impl MockWebSocketServer {
    /// Starts an echoing server on a random local port.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to a local port.
    pub async fn new() -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(SharedState::default());
        let (disconnect_tx, _) = broadcast::channel(4);

        let server_handle = Self::spawn_server(listener, state.clone(), disconnect_tx.clone());

        Ok(Self { addr, state, server_handle, disconnect_tx })
    }

    /// Starts a server that accepts connections and requests but never answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to a local port.
    pub async fn silent() -> Result<Self, std::io::Error> {
        let server = Self::new().await?;
        server.set_silent(true);
        Ok(server)
    }

    fn spawn_server(
        listener: TcpListener,
        state: Arc<SharedState>,
        disconnect_tx: broadcast::Sender<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(Self::handle_connection(
                    stream,
                    state.clone(),
                    disconnect_tx.subscribe(),
                ));
            }
        })
    }

    async fn handle_connection(
        stream: TcpStream,
        state: Arc<SharedState>,
        mut disconnect_rx: broadcast::Receiver<()>,
    ) {
        let Ok(ws_stream) = accept_async(stream).await else { return };
        state.connections.fetch_add(1, Ordering::SeqCst);

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.as_str().to_owned();
                        state.received.write().await.push(text.clone());

                        if state.silent.load(Ordering::SeqCst) {
                            continue;
                        }
                        let Some(reply) = echo_reply(&text) else { continue };
                        if write.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                _ = disconnect_rx.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    /// WebSocket URL of this server.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::SeqCst);
    }

    /// Closes every open connection. The server keeps accepting new ones.
    pub fn drop_connections(&self) {
        let _ = self.disconnect_tx.send(());
    }

    /// Number of WebSocket handshakes completed so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` handshakes have completed.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if self.connection_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Every text frame received so far, across all connections.
    pub async fn get_received_messages(&self) -> Vec<String> {
        self.state.received.read().await.clone()
    }
}

impl Drop for MockWebSocketServer {
    fn drop(&mut self) {
        let _ = self.disconnect_tx.send(());
        self.server_handle.abort();
    }
}

fn echo_reply(request: &str) -> Option<String> {
    let request: Value = serde_json::from_str(request).ok()?;
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    Some(json!({ "jsonrpc": "2.0", "id": request.get("id")?, "result": params }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn test_mock_websocket_server_creation() {
        let server = MockWebSocketServer::new().await.unwrap();
        assert!(server.url().starts_with("ws://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_echoes_params_under_request_id() {
        let server = MockWebSocketServer::new().await.unwrap();
        let (mut ws_stream, _) = connect_async(server.url()).await.expect("Failed to connect");

        let request = json!({"jsonrpc": "2.0", "id": 42, "method": "eth_chainId", "params": ["x"]});
        ws_stream.send(Message::Text(request.to_string().into())).await.unwrap();

        let Some(Ok(Message::Text(text))) = ws_stream.next().await else {
            panic!("Expected text reply");
        };
        let reply: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(reply["id"], 42);
        assert_eq!(reply["result"], json!(["x"]));
        assert_eq!(server.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_silent_server_records_but_never_answers() {
        let server = MockWebSocketServer::silent().await.unwrap();
        let (mut ws_stream, _) = connect_async(server.url()).await.expect("Failed to connect");

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "eth_chainId", "params": []});
        ws_stream.send(Message::Text(request.to_string().into())).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_millis(200), ws_stream.next()).await;
        assert!(reply.is_err(), "silent server must not reply");
        assert_eq!(server.get_received_messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_connections_sends_close() {
        let server = MockWebSocketServer::new().await.unwrap();
        let (mut ws_stream, _) = connect_async(server.url()).await.expect("Failed to connect");
        assert!(server.wait_for_connections(1, Duration::from_secs(2)).await);

        server.drop_connections();

        let message = tokio::time::timeout(Duration::from_secs(2), ws_stream.next())
            .await
            .expect("connection should be closed promptly");
        assert!(matches!(message, Some(Ok(Message::Close(_))) | Some(Err(_)) | None));
    }
}
