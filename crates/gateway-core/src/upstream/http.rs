//! Request/response upstream over HTTP(S).

use crate::{
    metrics::MetricsCollector,
    types::Call,
    upstream::{http_client::HttpClient, UpstreamError},
    utils::block_param::BlockParameter,
};
use bytes::Bytes;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

/// Schedule of the background block-height refresh.
#[derive(Debug, Clone, Copy)]
pub struct BlockRefreshConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for BlockRefreshConfig {
    fn default() -> Self {
        Self { initial_delay: Duration::from_secs(5), interval: Duration::from_secs(30) }
    }
}

/// An HTTP upstream with an optional archival companion endpoint.
///
/// Calls are posted verbatim. When an archival URL is configured, reads of state
/// older than the cached head are sent there instead of the primary URL, and a
/// background task keeps the cached head current.
pub struct HttpUpstream {
    url: String,
    archival_url: Option<String>,
    client: HttpClient,
    block_height: AtomicU64,
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("url", &self.url)
            .field("archival_url", &self.archival_url)
            .field("block_height", &self.block_height())
            .finish_non_exhaustive()
    }
}

impl HttpUpstream {
    /// Creates an upstream. An archival URL equal to the primary is ignored.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        archival_url: Option<String>,
        client: HttpClient,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let url = url.into();
        let archival_url = archival_url.filter(|archival| *archival != url);
        Self { url, archival_url, client, block_height: AtomicU64::new(0), metrics }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn archival_url(&self) -> Option<&str> {
        self.archival_url.as_deref()
    }

    pub(crate) fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Last block height observed on the primary endpoint, or 0 before the first
    /// successful refresh.
    #[must_use]
    pub fn block_height(&self) -> u64 {
        self.block_height.load(Ordering::Relaxed)
    }

    /// Picks the endpoint for `call` and posts its raw body there.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the HTTP client, including non-2xx statuses.
    pub async fn handle(&self, call: &Call) -> Result<Bytes, UpstreamError> {
        let url = match &self.archival_url {
            Some(archival) if call.is_archival_read(self.block_height()) => {
                debug!(method = %call.method, upstream = %self.url, "routing call to archival endpoint");
                archival
            }
            _ => &self.url,
        };

        self.client.post_json(url, call.raw.clone()).await
    }

    /// Asks the primary endpoint for its head and caches the answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe fails or its `result` is not a block number. The
    /// cached height is left untouched in that case.
    pub async fn refresh_block_height(&self) -> Result<u64, UpstreamError> {
        let body = self.handle(&Call::block_number_probe()).await?;
        let height = BlockParameter::from_block_number_response(&body).ok_or_else(|| {
            UpstreamError::InvalidResponse("eth_blockNumber result is missing or malformed".into())
        })?;

        self.block_height.store(height, Ordering::Relaxed);
        self.metrics.record_block_height(&self.url, height);
        debug!(upstream = %self.url, height, "refreshed block height");
        Ok(height)
    }

    /// Spawns the block-height refresher when an archival endpoint is configured.
    ///
    /// The task stops when `shutdown` fires or its sender is dropped.
    pub fn spawn_block_refresher(
        self: &Arc<Self>,
        schedule: BlockRefreshConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        self.archival_url.as_ref()?;
        let upstream = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut delay = schedule.initial_delay;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!(upstream = %upstream.url, "block height refresher stopped");
                        return;
                    }
                    () = tokio::time::sleep(delay) => {}
                }

                if let Err(e) = upstream.refresh_block_height().await {
                    warn!(upstream = %upstream.url, error = %e, "block height refresh failed");
                }
                delay = schedule.interval;
            }
        }))
    }
}
