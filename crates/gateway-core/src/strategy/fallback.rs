//! Fallback strategy: ordered failover with a health cooldown.
//!
//! A shared cursor names the preferred upstream. A call starts there and walks the
//! ring for at most one lap, skipping upstreams that are cooling down. A failed
//! upstream is marked unhealthy, the cursor moves past it, and a timer restores
//! its health after the cooldown. Health flags and the cursor are shared by all
//! concurrent calls, so a failover observed by one call steers the others too.

use super::StrategyError;
use crate::{
    metrics::MetricsCollector,
    types::Call,
    upstream::{Upstream, UpstreamError},
};
use bytes::Bytes;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::info;

/// Cursor and per-upstream health flags.
#[derive(Debug)]
pub(crate) struct FallbackState {
    current: AtomicUsize,
    healthy: Box<[AtomicBool]>,
}

impl FallbackState {
    pub(crate) fn new(upstream_count: usize) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            healthy: (0..upstream_count).map(|_| AtomicBool::new(true)).collect(),
        })
    }

    pub(crate) fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub(crate) fn is_healthy(&self, index: usize) -> bool {
        self.healthy.get(index).is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Walks the ring from the cursor, calling `attempt` on each healthy index until
    /// one succeeds. `on_failover(from, to, error)` runs after each failure.
    pub(crate) async fn run<A, Fut, O>(
        self: &Arc<Self>,
        cooldown: Duration,
        mut attempt: A,
        mut on_failover: O,
    ) -> Result<Bytes, StrategyError>
    where
        A: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<Bytes, UpstreamError>>,
        O: FnMut(usize, usize, &UpstreamError),
    {
        let count = self.healthy.len();
        let start = self.current();

        for offset in 0..count {
            let index = (start + offset) % count;
            if !self.is_healthy(index) {
                continue;
            }

            match attempt(index).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    let next = (index + 1) % count;
                    self.healthy[index].store(false, Ordering::Release);
                    self.current.store(next, Ordering::Release);
                    on_failover(index, next, &e);
                    self.schedule_recovery(index, cooldown);
                }
            }
        }

        Err(StrategyError::NoValidUpstream)
    }

    /// Marks the upstream at `index` healthy again once `cooldown` has elapsed.
    fn schedule_recovery(self: &Arc<Self>, index: usize, cooldown: Duration) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            state.healthy[index].store(true, Ordering::Release);
        });
    }
}

#[derive(Debug)]
pub struct FallbackStrategy {
    upstreams: Arc<[Upstream]>,
    state: Arc<FallbackState>,
    cooldown: Duration,
    metrics: Arc<MetricsCollector>,
}

impl FallbackStrategy {
    #[must_use]
    pub fn new(
        upstreams: Arc<[Upstream]>,
        cooldown: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let state = FallbackState::new(upstreams.len());
        Self { upstreams, state, cooldown, metrics }
    }

    /// Index of the upstream the next call starts from.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.state.current()
    }

    #[must_use]
    pub fn is_healthy(&self, index: usize) -> bool {
        self.state.is_healthy(index)
    }

    /// # Errors
    ///
    /// Returns [`StrategyError::NoValidUpstream`] when no healthy upstream answered
    /// within one lap of the ring.
    pub async fn handle(&self, call: &Call) -> Result<Bytes, StrategyError> {
        let upstreams = &self.upstreams;
        self.state
            .run(
                self.cooldown,
                move |index| upstreams[index].handle(call),
                move |from, to, error| {
                    let (from, to) = (upstreams[from].url(), upstreams[to].url());
                    info!(from = %from, to = %to, error = %error, "upstream failed, switching");
                    self.metrics.record_failover(from, to);
                },
            )
            .await
    }
}
