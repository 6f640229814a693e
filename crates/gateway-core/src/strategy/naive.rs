use super::StrategyError;
use crate::{types::Call, upstream::Upstream};
use bytes::Bytes;
use tracing::debug;

/// Forwards every call to a single upstream and returns its outcome unchanged.
///
/// A JSON-RPC body that arrives with a non-2xx HTTP status is forwarded as the
/// answer, so callers see the upstream's own error payload.
#[derive(Debug)]
pub struct NaiveStrategy {
    upstream: Upstream,
}

impl NaiveStrategy {
    #[must_use]
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    /// # Errors
    ///
    /// Returns the upstream's transport error when it did not answer with a
    /// JSON-RPC body.
    pub async fn handle(&self, call: &Call) -> Result<Bytes, StrategyError> {
        match self.upstream.handle(call).await {
            Ok(body) => Ok(body),
            Err(e) => match e.answered_body() {
                Some(body) => {
                    debug!(
                        upstream = %self.upstream.url(),
                        error = %e,
                        "forwarding upstream error body"
                    );
                    Ok(body.clone())
                }
                None => Err(e.into()),
            },
        }
    }
}
