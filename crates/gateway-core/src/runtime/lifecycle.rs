//! Hot-swappable holder of the live running configuration.

use super::builder::{BuildError, RunningConfiguration};
use crate::{
    config::{GatewayConfig, TimingsConfig},
    metrics::MetricsCollector,
};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Owns the live [`RunningConfiguration`] and replaces it atomically on reload.
///
/// Readers take one snapshot per call with [`ConfigHandle::load`] and use it for
/// the whole call, so a reload never changes the upstream set under a call in
/// flight.
pub struct ConfigHandle {
    current: ArcSwap<RunningConfiguration>,
    timings: TimingsConfig,
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle").field("current", &self.current.load()).finish_non_exhaustive()
    }
}

impl ConfigHandle {
    /// Builds the initial configuration.
    ///
    /// Timings are fixed for the lifetime of the handle; reloads only replace the
    /// gateway record.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the configuration cannot be built.
    pub fn new(
        config: &GatewayConfig,
        timings: TimingsConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, BuildError> {
        let running = RunningConfiguration::build(config, &timings, Arc::clone(&metrics))?;
        Ok(Self { current: ArcSwap::from_pointee(running), timings, metrics })
    }

    /// The live snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<RunningConfiguration> {
        self.current.load_full()
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Builds a new snapshot from `config` and swaps it in.
    ///
    /// The previous snapshot's background tasks are stopped once the new one is
    /// live. Calls already holding the previous snapshot finish against it.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the new configuration cannot be built. The
    /// previous snapshot stays live in that case.
    pub fn reload(&self, config: &GatewayConfig) -> Result<(), BuildError> {
        let next =
            Arc::new(RunningConfiguration::build(config, &self.timings, Arc::clone(&self.metrics))?);
        let previous = self.current.swap(next);
        previous.shutdown();
        info!(strategy = %config.strategy, "running configuration reloaded");
        Ok(())
    }

    /// Stops the live snapshot's background tasks.
    pub fn shutdown(&self) {
        info!("stopping running configuration");
        self.current.load().shutdown();
    }
}
