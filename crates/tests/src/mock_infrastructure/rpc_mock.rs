//! HTTP upstream doubles built on mockito.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

fn method_matcher(method: &str) -> Matcher {
    Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#))
}

/// A mock Ethereum node answering JSON-RPC over HTTP.
///
/// Responses always carry id `1`; the gateway forwards HTTP bodies unchanged, so
/// tests assert on `result`/`error` rather than on the id.
pub struct RpcMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl RpcMockBuilder {
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new() }
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Answers `eth_blockNumber` with `block_number` in hex.
    pub fn mock_block_number(&mut self, block_number: u64) -> &mut Self {
        self.mock_result("eth_blockNumber", &json!(format!("0x{block_number:x}")))
    }

    /// Answers every call to `method` with a successful `result`.
    pub fn mock_result(&mut self, method: &str, result: &Value) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
            .create();

        self.mocks.push(mock);
        self
    }

    /// Answers `method` with a JSON-RPC error object and HTTP 200.
    pub fn mock_rpc_error(&mut self, method: &str, code: i32, message: &str) -> &mut Self {
        self.mock_rpc_error_with_status(method, 200, code, message)
    }

    /// Answers `method` with a JSON-RPC error object under the given HTTP status.
    pub fn mock_rpc_error_with_status(
        &mut self,
        method: &str,
        status: usize,
        code: i32,
        message: &str,
    ) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": code, "message": message }
                })
                .to_string(),
            )
            .create();

        self.mocks.push(mock);
        self
    }

    /// Answers every request with HTTP 500.
    pub fn mock_server_error(&mut self) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .with_status(500)
            .with_body("Internal Server Error")
            .create();

        self.mocks.push(mock);
        self
    }

    /// True once every registered mock has been hit at least once.
    pub async fn verify_all_called(&self) -> bool {
        for mock in &self.mocks {
            if !mock.matched_async().await {
                return false;
            }
        }
        true
    }

    /// Number of registered mocks that have been hit.
    pub async fn matched_count(&self) -> usize {
        let mut count = 0;
        for mock in &self.mocks {
            if mock.matched_async().await {
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rpc_mock_builder_creation() {
        let mock = RpcMockBuilder::new().await;
        assert!(mock.url().starts_with("http://"));
    }

    #[tokio::test]
    async fn test_unmatched_mocks_are_reported() {
        let mut mock = RpcMockBuilder::new().await;
        mock.mock_block_number(100).mock_result("eth_chainId", &json!("0x1"));

        assert!(!mock.verify_all_called().await);
        assert_eq!(mock.matched_count().await, 0);
    }
}
