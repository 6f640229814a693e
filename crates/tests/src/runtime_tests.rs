//! Integration tests for building and hot-reloading the running configuration.
//!
//! A configuration that fails to build must never be installed, and a successful
//! reload must route new calls to the new upstreams while the previous snapshot's
//! background tasks wind down.

use crate::mock_infrastructure::{
    build_handle, fast_timings, gateway_config, parse_body, rpc_request, unreachable_url,
    wait_until, MockWebSocketServer, RpcMockBuilder,
};
use gateway_core::{
    config::GatewayConfig,
    proxy::Gateway,
    runtime::BuildError,
    strategy::StrategyKind,
    upstream::{Upstream, UpstreamError},
};
use serde_json::json;
use std::time::Duration;

fn build_error(config: &GatewayConfig) -> BuildError {
    match build_handle(config, fast_timings()) {
        Ok(_) => panic!("configuration {config:?} should not build"),
        Err(e) => e,
    }
}

#[tokio::test]
async fn test_build_rejects_invalid_configurations() {
    let http = unreachable_url("http");

    let error = build_error(&gateway_config("NAIVE", &[]));
    assert!(matches!(error, BuildError::NoUpstreams));
    assert_eq!(error.to_string(), "need upstreams");

    let error = build_error(&gateway_config("NAIVE", &[http.clone(), http.clone()]));
    assert_eq!(error.to_string(), "naive proxy strategy require exact 1 upstream");

    let error = build_error(&gateway_config("RACE", &[http.clone()]));
    assert_eq!(error.to_string(), "race proxy strategy require more than 1 upstream");

    let error = build_error(&gateway_config("FALLBACK", &[http.clone()]));
    assert_eq!(error.to_string(), "fallback proxy strategy require more than 1 upstream");

    let error = build_error(&gateway_config("", &[http.clone()]));
    assert!(matches!(error, BuildError::UnsupportedStrategy(_)));

    let error = build_error(&gateway_config("naive", &[http]));
    assert_eq!(error.to_string(), "blank of unsupported strategy: naive");
}

#[tokio::test]
async fn test_build_rejects_unusable_upstream_urls() {
    let error = build_error(&gateway_config("NAIVE", &["ftp://node.example.org".to_string()]));
    assert!(matches!(
        error,
        BuildError::Upstream { source: UpstreamError::UnsupportedScheme(ref scheme), .. } if scheme == "ftp"
    ));

    let error = build_error(&gateway_config("NAIVE", &["not a url".to_string()]));
    assert!(matches!(error, BuildError::Upstream { source: UpstreamError::InvalidUrl(..), .. }));
}

#[tokio::test]
async fn test_reload_routes_new_calls_to_new_upstreams() {
    let mut first = RpcMockBuilder::new().await;
    first.mock_result("eth_chainId", &json!("0x1"));
    let mut second = RpcMockBuilder::new().await;
    second.mock_result("eth_chainId", &json!("0x2"));

    let handle = build_handle(&gateway_config("NAIVE", &[first.url()]), fast_timings()).unwrap();
    let gateway = Gateway::new(handle.clone());

    let body = gateway.handle(rpc_request(&json!(1), "eth_chainId", &json!([]))).await.unwrap();
    assert_eq!(parse_body(&body)["result"], "0x1");

    handle.reload(&gateway_config("RACE", &[second.url(), unreachable_url("http")])).unwrap();
    assert_eq!(handle.load().strategy().kind(), StrategyKind::Race);

    let body = gateway.handle(rpc_request(&json!(2), "eth_chainId", &json!([]))).await.unwrap();
    assert_eq!(parse_body(&body)["result"], "0x2");
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_configuration() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_result("eth_chainId", &json!("0x1"));

    let handle = build_handle(&gateway_config("NAIVE", &[node.url()]), fast_timings()).unwrap();
    let gateway = Gateway::new(handle.clone());

    let result = handle.reload(&gateway_config("FALLBACK", &[node.url()]));
    assert!(matches!(result, Err(BuildError::UpstreamCount(_))));

    let running = handle.load();
    assert_eq!(running.strategy().kind(), StrategyKind::Naive);
    assert_eq!(running.upstreams()[0].url(), node.url());

    let body = gateway.handle(rpc_request(&json!(1), "eth_chainId", &json!([]))).await.unwrap();
    assert_eq!(parse_body(&body)["result"], "0x1");
}

#[tokio::test]
async fn test_reload_stops_previous_stream_connections() {
    let server = MockWebSocketServer::new().await.unwrap();
    let node = RpcMockBuilder::new().await;

    let handle = build_handle(&gateway_config("NAIVE", &[server.url()]), fast_timings()).unwrap();

    let previous = handle.load();
    let Upstream::Stream(stream) = previous.upstreams()[0].clone() else {
        panic!("expected a stream upstream");
    };
    assert!(wait_until(Duration::from_secs(2), || std::future::ready(stream.is_connected())).await);

    handle.reload(&gateway_config("NAIVE", &[node.url()])).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || std::future::ready(!stream.is_connected())).await,
        "the replaced snapshot's connection loop should exit"
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connection_count(), 1, "the replaced upstream must not redial");
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let server = MockWebSocketServer::new().await.unwrap();
    let handle = build_handle(&gateway_config("NAIVE", &[server.url()]), fast_timings()).unwrap();

    let Upstream::Stream(stream) = handle.load().upstreams()[0].clone() else {
        panic!("expected a stream upstream");
    };
    assert!(wait_until(Duration::from_secs(2), || std::future::ready(stream.is_connected())).await);

    handle.shutdown();
    handle.shutdown();

    assert!(wait_until(Duration::from_secs(2), || std::future::ready(!stream.is_connected())).await);
}
