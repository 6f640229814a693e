//! Assembly of a [`RunningConfiguration`] from a configuration record.

use crate::{
    config::{GatewayConfig, TimingsConfig},
    metrics::MetricsCollector,
    policy::Policy,
    strategy::{FallbackStrategy, NaiveStrategy, RaceStrategy, Strategy, StrategyKind},
    upstream::{HttpClient, Upstream, UpstreamContext, UpstreamError},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Configuration-time failures. A configuration that fails to build is never
/// installed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("need upstreams")]
    NoUpstreams,

    /// The upstream count does not fit the strategy.
    #[error("{0}")]
    UpstreamCount(&'static str),

    #[error("blank of unsupported strategy: {0}")]
    UnsupportedStrategy(String),

    /// An upstream URL could not be turned into a transport.
    #[error("upstream {url}: {source}")]
    Upstream {
        url: String,
        #[source]
        source: UpstreamError,
    },

    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(String),
}

/// An immutable snapshot binding a strategy to its upstreams and policy tables.
///
/// Background work started for this snapshot (stream connection loops, block
/// height refreshers) stops when [`RunningConfiguration::shutdown`] is called or
/// the snapshot is dropped.
pub struct RunningConfiguration {
    upstreams: Arc<[Upstream]>,
    strategy: Strategy,
    method_limitation_enabled: bool,
    policy: Policy,
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for RunningConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningConfiguration")
            .field("strategy", &self.strategy.kind())
            .field("upstreams", &self.upstreams.iter().map(Upstream::url).collect::<Vec<_>>())
            .field("method_limitation_enabled", &self.method_limitation_enabled)
            .finish_non_exhaustive()
    }
}

impl RunningConfiguration {
    /// Validates `config` and builds a snapshot, starting its upstream tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when there are no upstreams, the strategy name is
    /// blank or unknown, the upstream count does not fit the strategy, or an
    /// upstream cannot be constructed.
    pub fn build(
        config: &GatewayConfig,
        timings: &TimingsConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, BuildError> {
        let endpoints = config.endpoints();
        if endpoints.is_empty() {
            return Err(BuildError::NoUpstreams);
        }

        let kind: StrategyKind =
            config.strategy.parse().map_err(BuildError::UnsupportedStrategy)?;
        if let Some(requirement) = kind.upstream_count_error(endpoints.len()) {
            return Err(BuildError::UpstreamCount(requirement));
        }

        let http_client = HttpClient::with_config(&timings.http_client())
            .map_err(|e| BuildError::HttpClientInit(e.to_string()))?;
        let context = UpstreamContext {
            http_client,
            block_refresh: timings.block_refresh(),
            stream: timings.stream(),
            metrics: Arc::clone(&metrics),
        };

        // dropping this sender on an early return stops any task already spawned
        let (shutdown_tx, _) = broadcast::channel(1);
        let upstreams = endpoints
            .iter()
            .map(|endpoint| {
                let upstream = Upstream::from_url(
                    &endpoint.url,
                    endpoint.archival_url.as_deref(),
                    &context,
                    &shutdown_tx,
                )
                .map_err(|source| BuildError::Upstream { url: endpoint.url.clone(), source })?;
                debug!(
                    upstream = %endpoint.url,
                    archival = ?endpoint.archival_url,
                    "upstream configured"
                );
                Ok(upstream)
            })
            .collect::<Result<Arc<[Upstream]>, BuildError>>()?;

        let strategy = match kind {
            StrategyKind::Naive => Strategy::Naive(NaiveStrategy::new(upstreams[0].clone())),
            StrategyKind::Race => {
                Strategy::Race(RaceStrategy::new(Arc::clone(&upstreams), timings.race_timeout()))
            }
            StrategyKind::Fallback => Strategy::Fallback(FallbackStrategy::new(
                Arc::clone(&upstreams),
                timings.fallback_cooldown(),
                metrics,
            )),
        };

        let policy = Policy::new(
            config.allowed_methods.iter().cloned(),
            config.contract_whitelist.iter().cloned(),
        );

        info!(
            strategy = %kind,
            upstreams = upstreams.len(),
            method_limitation_enabled = config.method_limitation_enabled,
            "running configuration built"
        );

        Ok(Self {
            upstreams,
            strategy,
            method_limitation_enabled: config.method_limitation_enabled,
            policy,
            shutdown_tx,
        })
    }

    #[must_use]
    pub fn upstreams(&self) -> &[Upstream] {
        &self.upstreams
    }

    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    #[must_use]
    pub fn method_limitation_enabled(&self) -> bool {
        self.method_limitation_enabled
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Tells this snapshot's background tasks to stop. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("no background tasks to stop");
        }
    }
}
