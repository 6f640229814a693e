//! Race strategy: every upstream gets the call, the first successful body wins.
//!
//! Each upstream runs in its own task so that a panicking transport is contained
//! and counted as an erroring contender instead of taking the call down. Outcomes
//! are merged in completion order:
//!
//! 1. A body without a top-level `error` member is returned at once. The other
//!    tasks keep running and their results are discarded.
//! 2. Once every contender has finished without a success, the first body that
//!    carried an error is returned, forwarding the upstream's own error payload.
//!    A JSON-RPC body sent with a non-2xx HTTP status counts as such a body.
//! 3. If no contender produced a body at all, the race fails with
//!    [`StrategyError::AllUpstreamsFailed`].
//!
//! One deadline bounds the whole race; it yields [`StrategyError::Timeout`] even
//! when an error body is already in hand.

use super::StrategyError;
use crate::{
    types::{is_success_body, Call},
    upstream::{Upstream, UpstreamError},
};
use bytes::Bytes;
use futures_util::{stream::FuturesUnordered, StreamExt};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RaceStrategy {
    upstreams: Arc<[Upstream]>,
    timeout: Duration,
}

impl RaceStrategy {
    #[must_use]
    pub fn new(upstreams: Arc<[Upstream]>, timeout: Duration) -> Self {
        Self { upstreams, timeout }
    }

    /// # Errors
    ///
    /// Returns [`StrategyError::Timeout`] or [`StrategyError::AllUpstreamsFailed`].
    pub async fn handle(&self, call: &Call) -> Result<Bytes, StrategyError> {
        let call = Arc::new(call.clone());
        let contenders = self.upstreams.iter().cloned().map(|upstream| {
            let call = Arc::clone(&call);
            async move { upstream.handle(&call).await }
        });

        race(contenders, self.timeout).await
    }
}

/// Runs every contender on its own task and merges their outcomes.
pub(crate) async fn race<I, F>(contenders: I, timeout: Duration) -> Result<Bytes, StrategyError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<Bytes, UpstreamError>> + Send + 'static,
{
    let mut running: FuturesUnordered<_> = contenders.into_iter().map(tokio::spawn).collect();
    let total = running.len();

    let settled = tokio::time::timeout(timeout, async {
        let mut first_failed = None;
        let mut failed = 0usize;
        let mut erroring = 0usize;

        while let Some(joined) = running.next().await {
            match joined {
                Ok(Ok(body)) if is_success_body(&body) => return Ok(body),
                Ok(Ok(body)) => {
                    failed += 1;
                    first_failed.get_or_insert(body);
                }
                Ok(Err(e)) => {
                    failed += 1;
                    debug!(error = %e, "race contender failed");
                    if let Some(body) = e.answered_body() {
                        first_failed.get_or_insert_with(|| body.clone());
                    }
                }
                Err(e) => {
                    erroring += 1;
                    warn!(error = %e, "race contender panicked");
                }
            }
        }

        debug!(total, failed, erroring, "race settled without a successful response");
        first_failed.ok_or(StrategyError::AllUpstreamsFailed)
    })
    .await;

    settled.unwrap_or_else(|_| {
        debug!(total, timeout_ms = timeout.as_millis(), "race timed out");
        Err(StrategyError::Timeout)
    })
}
