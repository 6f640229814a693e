//! Upstream transports.
//!
//! An [`Upstream`] is one backend JSON-RPC endpoint. There are exactly two kinds:
//!
//! - [`HttpUpstream`]: plain request/response over HTTP(S). The raw call body is
//!   posted as-is. An optional archival companion URL receives reads of old state.
//! - [`StreamUpstream`]: one persistent WebSocket connection per upstream shared by
//!   all concurrent calls, with correlation ids and automatic reconnection.
//!
//! The kind is chosen from the URL scheme by [`Upstream::from_url`]. Both kinds are
//! safe to call concurrently without external synchronization and own whatever
//! mutable state they carry.

pub mod errors;
pub mod http;
pub mod http_client;
pub mod stream;

pub use errors::UpstreamError;
pub use http::{BlockRefreshConfig, HttpUpstream};
pub use http_client::{HttpClient, HttpClientConfig};
pub use stream::{StreamConfig, StreamUpstream};

use crate::{metrics::MetricsCollector, types::Call};
use bytes::Bytes;
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything needed to turn a URL into a live upstream.
#[derive(Debug, Clone)]
pub struct UpstreamContext {
    pub http_client: HttpClient,
    pub block_refresh: BlockRefreshConfig,
    pub stream: StreamConfig,
    pub metrics: Arc<MetricsCollector>,
}

/// One configured backend endpoint.
#[derive(Debug, Clone)]
pub enum Upstream {
    Http(Arc<HttpUpstream>),
    Stream(Arc<StreamUpstream>),
}

impl Upstream {
    /// Builds an upstream from its URL, dispatching on the scheme.
    ///
    /// `http`/`https` yield an HTTP upstream, which starts its block-height refresher
    /// when a distinct `archival_url` is given. `ws`/`wss` yield a stream upstream,
    /// which starts its connection loop; `archival_url` is ignored for streams.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidUrl`] when `url` does not parse and
    /// [`UpstreamError::UnsupportedScheme`] for any other scheme.
    pub fn from_url(
        url: &str,
        archival_url: Option<&str>,
        context: &UpstreamContext,
        shutdown: &broadcast::Sender<()>,
    ) -> Result<Self, UpstreamError> {
        let parsed =
            Url::parse(url).map_err(|e| UpstreamError::InvalidUrl(url.to_string(), e.to_string()))?;

        match parsed.scheme() {
            "http" | "https" => {
                if let Some(archival) = archival_url {
                    Url::parse(archival).map_err(|e| {
                        UpstreamError::InvalidUrl(archival.to_string(), e.to_string())
                    })?;
                }

                let upstream = Arc::new(HttpUpstream::new(
                    url,
                    archival_url.map(str::to_string),
                    context.http_client.clone(),
                    Arc::clone(&context.metrics),
                ));
                upstream.spawn_block_refresher(context.block_refresh, shutdown.subscribe());
                Ok(Self::Http(upstream))
            }
            "ws" | "wss" => Ok(Self::Stream(Arc::new(StreamUpstream::connect(
                url,
                context.stream,
                Arc::clone(&context.metrics),
                shutdown.subscribe(),
            )))),
            other => Err(UpstreamError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Forwards `call` to this upstream.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn handle(&self, call: &Call) -> Result<Bytes, UpstreamError> {
        let (result, metrics) = match self {
            Self::Http(upstream) => (upstream.handle(call).await, upstream.metrics()),
            Self::Stream(upstream) => (upstream.handle(call).await, upstream.metrics()),
        };

        if let Err(e) = &result {
            tracing::debug!(upstream = %self.url(), method = %call.method, error = %e, "upstream call failed");
            metrics.record_upstream_error(self.url(), e);
        }
        result
    }

    /// The configured primary URL, used as this upstream's label in logs and metrics.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Http(upstream) => upstream.url(),
            Self::Stream(upstream) => upstream.url(),
        }
    }
}
