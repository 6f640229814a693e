//! Persistent multiplexed upstream over a WebSocket connection.
//!
//! One connection is kept open per upstream and shared by every concurrent call.
//! Each call is tagged with a fresh correlation id before it is written, and the
//! reader hands each response to whichever call registered that id.
//!
//! ```text
//! handle() ──► pending.insert(id) ──► queue ──► writer ──► socket
//!    ▲                                                        │
//!    └──────────── oneshot ◄── pending.remove(id) ◄── reader ◄┘
//! ```
//!
//! Callers never observe connection churn directly: a call made while the
//! connection is down waits in the queue until the next connection drains it, or
//! fails with [`UpstreamError::Timeout`].

use crate::{metrics::MetricsCollector, types::Call, upstream::UpstreamError};
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{value::RawValue, Value};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, oneshot},
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = DashMap<u64, oneshot::Sender<Bytes>>;

/// Timeouts and sizing of a stream upstream.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Maximum wait for a slot in the outbound queue.
    pub enqueue_timeout: Duration,
    /// Maximum wait for the matching response once queued.
    pub response_timeout: Duration,
    /// Delay before redialing after a failed dial or a dropped connection.
    pub reconnect_backoff: Duration,
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enqueue_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            reconnect_backoff: Duration::from_secs(5),
            queue_capacity: 1024,
        }
    }
}

struct Outbound {
    id: u64,
    frame: String,
}

#[derive(Deserialize)]
struct Correlation<'a> {
    #[serde(borrow)]
    id: Option<&'a RawValue>,
}

/// Removes a pending entry when the owning call returns, whichever way it returns.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// A WebSocket upstream multiplexing concurrent calls over one connection.
pub struct StreamUpstream {
    url: String,
    queue: mpsc::Sender<Outbound>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    config: StreamConfig,
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for StreamUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamUpstream")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl StreamUpstream {
    /// Creates the upstream and spawns its connection loop.
    ///
    /// The loop dials immediately and keeps redialing until `shutdown` fires, its
    /// sender is dropped, or this upstream is dropped. A dropped upstream is
    /// noticed at once while connected and before the next dial otherwise.
    #[must_use]
    pub fn connect(
        url: impl Into<String>,
        config: StreamConfig,
        metrics: Arc<MetricsCollector>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let url = url.into();
        let (queue, outbound) = mpsc::channel(config.queue_capacity.max(1));
        let pending = Arc::new(PendingMap::new());
        let connected = Arc::new(AtomicBool::new(false));

        let connection = Connection {
            url: url.clone(),
            pending: Arc::clone(&pending),
            connected: Arc::clone(&connected),
            backoff: config.reconnect_backoff,
            metrics: Arc::clone(&metrics),
        };
        tokio::spawn(connection.run(outbound, shutdown));

        Self {
            url,
            queue,
            pending,
            next_id: AtomicU64::new(unix_now_secs()),
            connected,
            config,
            metrics,
        }
    }

    pub(crate) fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of calls currently waiting for a response.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sends `call` over the shared connection and waits for its response.
    ///
    /// The response's `id` is rewritten back to the caller's original id.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Timeout`] if the call cannot be queued or answered in time
    /// - [`UpstreamError::StreamClosed`] if the connection loop has exited
    /// - [`UpstreamError::InvalidResponse`] if the call cannot be serialized
    pub async fn handle(&self, call: &Call) -> Result<Bytes, UpstreamError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = call.to_wire(id).map_err(|e| {
            UpstreamError::InvalidResponse(format!("call could not be serialized: {e}"))
        })?;

        let (waiter, response) = oneshot::channel();
        self.pending.insert(id, waiter);
        let _guard = PendingGuard { pending: &self.pending, id };

        match tokio::time::timeout(self.config.enqueue_timeout, self.queue.send(Outbound { id, frame }))
            .await
        {
            Err(_) => {
                debug!(upstream = %self.url, id, "stream queue full, call timed out");
                return Err(UpstreamError::Timeout);
            }
            Ok(Err(_)) => return Err(UpstreamError::StreamClosed),
            Ok(Ok(())) => {}
        }

        match tokio::time::timeout(self.config.response_timeout, response).await {
            Err(_) => {
                debug!(upstream = %self.url, id, method = %call.method, "stream call timed out");
                Err(UpstreamError::Timeout)
            }
            Ok(Err(_)) => Err(UpstreamError::StreamClosed),
            Ok(Ok(body)) => Ok(restore_id(body, &call.id)),
        }
    }
}

enum Teardown {
    Shutdown,
    QueueClosed,
    Disconnected(String),
}

/// State owned by the connection loop task.
struct Connection {
    url: String,
    pending: Arc<PendingMap>,
    connected: Arc<AtomicBool>,
    backoff: Duration,
    metrics: Arc<MetricsCollector>,
}

impl Connection {
    async fn run(
        self,
        mut outbound: mpsc::Receiver<Outbound>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        debug!(upstream = %self.url, "stream connection loop started");

        loop {
            if outbound.is_closed() {
                break;
            }

            let dialed = tokio::select! {
                _ = shutdown.recv() => break,
                dialed = tokio_tungstenite::connect_async(self.url.as_str()) => dialed,
            };

            match dialed {
                Ok((ws, _)) => {
                    info!(upstream = %self.url, "stream upstream connected");
                    self.set_connected(true);
                    let teardown = self.serve(ws, &mut outbound, &mut shutdown).await;
                    self.set_connected(false);

                    match teardown {
                        Teardown::Shutdown | Teardown::QueueClosed => break,
                        Teardown::Disconnected(reason) => warn!(
                            upstream = %self.url,
                            reason = %reason,
                            retry_in_ms = self.backoff.as_millis(),
                            "stream upstream disconnected"
                        ),
                    }
                }
                Err(e) => warn!(
                    upstream = %self.url,
                    error = %e,
                    retry_in_ms = self.backoff.as_millis(),
                    "stream upstream dial failed"
                ),
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(self.backoff) => {}
            }
        }

        debug!(upstream = %self.url, "stream connection loop exited");
    }

    /// Runs the writer and reader against one live connection until either fails.
    async fn serve(
        &self,
        ws: WsStream,
        outbound: &mut mpsc::Receiver<Outbound>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Teardown {
        let (mut sink, mut source) = ws.split();

        let writer = async {
            while let Some(Outbound { id, frame }) = outbound.recv().await {
                // the caller gave up while the call sat in the queue
                if !self.pending.contains_key(&id) {
                    continue;
                }
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    return Teardown::Disconnected(format!("write failed: {e}"));
                }
            }
            Teardown::QueueClosed
        };

        let reader = async {
            while let Some(message) = source.next().await {
                let payload = match message {
                    Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_bytes()),
                    Ok(Message::Binary(data)) => data,
                    Ok(Message::Close(_)) => {
                        return Teardown::Disconnected("closed by peer".to_string())
                    }
                    Ok(_) => continue,
                    Err(e) => return Teardown::Disconnected(format!("read failed: {e}")),
                };
                self.deliver(payload);
            }
            Teardown::Disconnected("stream ended".to_string())
        };

        tokio::select! {
            teardown = writer => teardown,
            teardown = reader => teardown,
            _ = shutdown.recv() => Teardown::Shutdown,
        }
    }

    fn deliver(&self, payload: Bytes) {
        let Some(id) = correlation_id(&payload) else {
            debug!(upstream = %self.url, "dropping stream message without a correlation id");
            return;
        };

        match self.pending.remove(&id) {
            Some((_, waiter)) => {
                let _ = waiter.send(payload);
            }
            None => debug!(upstream = %self.url, id, "dropping late stream response"),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        self.metrics.record_stream_connection(&self.url, connected);
    }
}

/// The raw top-level `id` of a JSON object body.
fn raw_id(payload: &[u8]) -> Option<&RawValue> {
    if payload.trim_ascii_start().first() != Some(&b'{') {
        return None;
    }
    serde_json::from_slice::<Correlation>(payload).ok()?.id
}

fn correlation_id(payload: &[u8]) -> Option<u64> {
    raw_id(payload)?.get().parse().ok()
}

/// Puts the caller's id back into a response received under a correlation id.
///
/// Only the bytes of the `id` value are replaced; the rest of the body is kept
/// as the upstream sent it. Bodies without a top-level id are returned unchanged.
fn restore_id(body: Bytes, id: &Value) -> Bytes {
    let Some(raw) = raw_id(&body) else {
        return body;
    };
    let Some(start) = (raw.get().as_ptr() as usize).checked_sub(body.as_ptr() as usize) else {
        return body;
    };
    let end = start + raw.get().len();
    let Ok(replacement) = serde_json::to_vec(id) else {
        return body;
    };

    let mut restored = Vec::with_capacity(body.len() - (end - start) + replacement.len());
    restored.extend_from_slice(&body[..start]);
    restored.extend_from_slice(&replacement);
    restored.extend_from_slice(&body[end..]);
    Bytes::from(restored)
}

fn unix_now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}
