//! Integration tests for archival read routing.
//!
//! An HTTP upstream with an archival companion learns the chain head from its
//! primary endpoint in the background, then sends `eth_call`/`eth_getBalance`
//! reads far behind that head to the companion.

use crate::mock_infrastructure::{
    build_gateway, fast_timings, gateway_config, parse_body, rpc_request, wait_until,
    RpcMockBuilder,
};
use gateway_core::{config::GatewayConfig, proxy::Gateway, upstream::Upstream};
use serde_json::json;
use std::time::Duration;

const ACCOUNT: &str = "0x06898143df04616a8a8f9614deb3b99ba12b3096";
const HEAD: u64 = 0x1000;

fn cached_height(gateway: &Gateway) -> u64 {
    match &gateway.config().load().upstreams()[0] {
        Upstream::Http(http) => http.block_height(),
        Upstream::Stream(_) => panic!("expected an HTTP upstream"),
    }
}

async fn balance_result(gateway: &Gateway, params: serde_json::Value) -> serde_json::Value {
    let body = gateway
        .handle(rpc_request(&json!(1), "eth_getBalance", &params))
        .await
        .expect("balance read should succeed");
    parse_body(&body)["result"].clone()
}

async fn primary_and_archive() -> (RpcMockBuilder, RpcMockBuilder) {
    let mut primary = RpcMockBuilder::new().await;
    primary.mock_block_number(HEAD).mock_result("eth_getBalance", &json!("0x1"));

    let mut archive = RpcMockBuilder::new().await;
    archive.mock_result("eth_getBalance", &json!("0xa"));

    (primary, archive)
}

#[tokio::test]
async fn test_old_reads_go_to_archive_after_refresh() {
    let (primary, archive) = primary_and_archive().await;

    let upstream = format!("{},{}", primary.url(), archive.url());
    let gateway = build_gateway(&gateway_config("NAIVE", &[upstream]), fast_timings());

    assert!(
        wait_until(Duration::from_secs(2), || std::future::ready(cached_height(&gateway) == HEAD))
            .await,
        "block height should be refreshed from the primary"
    );

    assert_eq!(balance_result(&gateway, json!([ACCOUNT, "0x10"])).await, "0xa");
    assert_eq!(balance_result(&gateway, json!([ACCOUNT, 16])).await, "0xa");

    assert_eq!(balance_result(&gateway, json!([ACCOUNT, "latest"])).await, "0x1");
    assert_eq!(balance_result(&gateway, json!([ACCOUNT, format!("0x{:x}", HEAD - 100)])).await, "0x1");
    assert_eq!(balance_result(&gateway, json!([ACCOUNT])).await, "0x1");
}

#[tokio::test]
async fn test_global_archival_url_applies_to_plain_entries() {
    let (primary, archive) = primary_and_archive().await;

    let config = GatewayConfig {
        archival_url: Some(archive.url()),
        ..gateway_config("NAIVE", &[primary.url()])
    };
    let gateway = build_gateway(&config, fast_timings());

    assert!(
        wait_until(Duration::from_secs(2), || std::future::ready(cached_height(&gateway) == HEAD))
            .await
    );
    assert_eq!(balance_result(&gateway, json!([ACCOUNT, "0x0"])).await, "0xa");
}

#[tokio::test]
async fn test_reads_stay_on_primary_before_first_refresh() {
    let (primary, archive) = primary_and_archive().await;

    let mut timings = fast_timings();
    timings.block_refresh_initial_delay_ms = 60_000;

    let upstream = format!("{},{}", primary.url(), archive.url());
    let gateway = build_gateway(&gateway_config("NAIVE", &[upstream]), timings);

    assert_eq!(cached_height(&gateway), 0);
    assert_eq!(balance_result(&gateway, json!([ACCOUNT, "0x10"])).await, "0x1");
}

#[tokio::test]
async fn test_no_refresher_without_archival_companion() {
    let mut primary = RpcMockBuilder::new().await;
    primary.mock_block_number(HEAD);

    let gateway = build_gateway(&gateway_config("NAIVE", &[primary.url()]), fast_timings());

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(cached_height(&gateway), 0);
    assert_eq!(primary.matched_count().await, 0);
}
