//! Integration tests for the JSON-RPC gateway.
//!
//! - `proxy_engine_tests`: strategies, access policy and error envelopes through
//!   the gateway engine
//! - `archival_routing_tests`: block height refresh and archival read routing
//! - `stream_upstream_tests`: WebSocket multiplexing, id restoration, timeouts and
//!   reconnection
//! - `runtime_tests`: configuration build errors and hot reload
//! - `mock_infrastructure`: reusable upstream doubles (mockito HTTP, scripted
//!   WebSocket)
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! Every test runs against in-process mock upstreams; no network access or
//! running node is needed.

#[cfg(test)]
mod archival_routing_tests;


#[cfg(test)]
mod runtime_tests;
