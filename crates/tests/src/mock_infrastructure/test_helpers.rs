//! Common helpers for building gateways and requests in tests.

use bytes::Bytes;
use gateway_core::{
    config::{GatewayConfig, TimingsConfig},
    metrics::MetricsCollector,
    proxy::Gateway,
    runtime::{BuildError, ConfigHandle},
};
use serde_json::{json, Value};
use std::{future::Future, sync::Arc, time::Duration};

/// Timings short enough for tests to observe refreshes, cooldowns and reconnects.
#[must_use]
pub fn fast_timings() -> TimingsConfig {
    TimingsConfig {
        http_request_timeout_ms: 2_000,
        block_refresh_initial_delay_ms: 10,
        block_refresh_interval_ms: 50,
        stream_enqueue_timeout_ms: 300,
        stream_response_timeout_ms: 300,
        stream_reconnect_backoff_ms: 50,
        race_timeout_ms: 2_000,
        fallback_cooldown_ms: 200,
        ..TimingsConfig::default()
    }
}

/// A gateway record with policy disabled.
#[must_use]
pub fn gateway_config(strategy: &str, upstreams: &[String]) -> GatewayConfig {
    GatewayConfig {
        upstreams: upstreams.iter().map(|url| url.as_str().into()).collect(),
        strategy: strategy.to_string(),
        ..GatewayConfig::default()
    }
}

/// Builds a config handle with a fresh metrics collector.
///
/// # Errors
///
/// Returns the build error for invalid configurations.
pub fn build_handle(
    config: &GatewayConfig,
    timings: TimingsConfig,
) -> Result<Arc<ConfigHandle>, BuildError> {
    ConfigHandle::new(config, timings, Arc::new(MetricsCollector::new())).map(Arc::new)
}

/// Builds a gateway, panicking on invalid configurations.
#[must_use]
#[allow(clippy::expect_used)]
pub fn build_gateway(config: &GatewayConfig, timings: TimingsConfig) -> Gateway {
    Gateway::new(build_handle(config, timings).expect("configuration should build"))
}

/// Serializes a JSON-RPC request body.
#[must_use]
pub fn rpc_request(id: &Value, method: &str, params: &Value) -> Bytes {
    Bytes::from(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }).to_string())
}

/// Parses a response body, panicking on invalid JSON.
#[must_use]
#[allow(clippy::expect_used)]
pub fn parse_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("response body should be JSON")
}

/// A `scheme://127.0.0.1:<port>` URL nothing listens on.
#[must_use]
#[allow(clippy::expect_used)]
pub fn unreachable_url(scheme: &str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("{scheme}://{addr}")
}

/// Polls `condition` every 10 ms until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_request_shape() {
        let body = parse_body(&rpc_request(&json!(3), "eth_chainId", &json!([])));
        assert_eq!(body["id"], 3);
        assert_eq!(body["method"], "eth_chainId");
        assert_eq!(body["params"], json!([]));
    }

    #[test]
    fn test_gateway_config_keeps_order() {
        let config = gateway_config("FALLBACK", &["http://a".to_string(), "http://b".to_string()]);
        let endpoints = config.endpoints();
        assert_eq!(endpoints[0].url, "http://a");
        assert_eq!(endpoints[1].url, "http://b");
        assert!(!config.method_limitation_enabled);
    }

    #[test]
    fn test_unreachable_url_has_scheme() {
        assert!(unreachable_url("ws").starts_with("ws://127.0.0.1:"));
    }
}
