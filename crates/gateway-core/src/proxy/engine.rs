use crate::{
    proxy::errors::ProxyError,
    runtime::{ConfigHandle, RunningConfiguration},
    types::{Call, ErrorEnvelope},
};
use bytes::Bytes;
use std::{sync::Arc, time::Instant};
use tracing::debug;

/// Outcome of one call, ready to be written back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResponse {
    /// Bytes produced by an upstream, forwarded unchanged.
    Success(Bytes),
    /// A rendered JSON-RPC error envelope.
    Failure(Bytes),
}

impl GatewayResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn into_body(self) -> Bytes {
        match self {
            Self::Success(body) | Self::Failure(body) => body,
        }
    }
}

/// Ties one raw request body to one response.
///
/// Each call reads the live running configuration exactly once, classifies the
/// body, enforces the access policy when enabled, and dispatches through the
/// configured strategy.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: Arc<ConfigHandle>,
}

impl Gateway {
    #[must_use]
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    /// Processes one raw JSON-RPC request body.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Policy`] when the call is denied and
    /// [`ProxyError::Strategy`] when no upstream produced a response.
    pub async fn handle(&self, raw: Bytes) -> Result<Bytes, ProxyError> {
        self.dispatch(&Call::parse(raw)).await
    }

    /// Like [`Gateway::handle`], rendering failures into the error envelope with the
    /// caller's id.
    pub async fn respond(&self, raw: Bytes) -> GatewayResponse {
        let call = Call::parse(raw);
        match self.dispatch(&call).await {
            Ok(body) => GatewayResponse::Success(body),
            Err(e) => GatewayResponse::Failure(ErrorEnvelope::new(&call.id, e.to_string()).to_bytes()),
        }
    }

    async fn dispatch(&self, call: &Call) -> Result<Bytes, ProxyError> {
        let running = self.config.load();
        let start = Instant::now();

        let result = self.route(&running, call).await;

        self.config.metrics().record_request(&call.method, result.is_ok(), start.elapsed());
        result
    }

    async fn route(&self, running: &RunningConfiguration, call: &Call) -> Result<Bytes, ProxyError> {
        if running.method_limitation_enabled() {
            if let Err(e) = running.policy().validate(call) {
                debug!(method = %call.method, reason = %e, "call denied by policy");
                self.config.metrics().record_policy_denial(&call.method, &e);
                return Err(e.into());
            }
        }

        Ok(running.strategy().handle(call).await?)
    }
}
