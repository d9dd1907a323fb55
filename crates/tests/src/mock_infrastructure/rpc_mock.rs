//! RPC mock builder for Ethereum JSON-RPC testing.
//!
//! Wraps mockito to provide responders for the methods the gateway issues itself.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

fn method_matcher(method: &str) -> Matcher {
    Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#))
}

/// Fake upstream node.
pub struct RpcMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl RpcMockBuilder {
    /// Creates a new RPC mock builder with a fresh mockito server.
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new() }
    }

    /// Returns the URL of the mock server.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Answers `method` with `result`, any number of times.
    pub fn mock_method(&mut self, method: &str, result: &Value) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
            .expect_at_least(0)
            .create();

        self.mocks.push(mock);
        self
    }

    /// Answers `method` with `result` and expects exactly `hits` calls.
    pub fn mock_method_times(&mut self, method: &str, result: &Value, hits: usize) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
            .expect(hits)
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks an `eth_getBalance` request.
    pub fn mock_balance(&mut self, wei: &str) -> &mut Self {
        self.mock_method("eth_getBalance", &json!(wei))
    }

    /// Mocks `net_version`, which the gateway uses as the chain id.
    pub fn mock_chain_id(&mut self, chain_id: u64) -> &mut Self {
        self.mock_method("net_version", &json!(chain_id.to_string()))
    }

    /// Mocks an `eth_getTransactionCount` request.
    pub fn mock_transaction_count(&mut self, nonce: u64) -> &mut Self {
        self.mock_method("eth_getTransactionCount", &json!(format!("0x{nonce:x}")))
    }

    /// Mocks an `eth_sendRawTransaction` request, answering `hits` times with `tx_hash`.
    pub fn mock_send_raw_transaction(&mut self, tx_hash: &str, hits: usize) -> &mut Self {
        self.mock_method_times("eth_sendRawTransaction", &json!(tx_hash), hits)
    }

    /// Mocks an `eth_call` request returning ABI-encoded `output`.
    pub fn mock_call(&mut self, output: &str) -> &mut Self {
        self.mock_method("eth_call", &json!(output))
    }

    /// Mocks an RPC error response.
    pub fn mock_rpc_error(&mut self, method: &str, code: i32, message: &str) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {
                        "code": code,
                        "message": message
                    }
                })
                .to_string(),
            )
            .expect_at_least(0)
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks a server error (500) for every request, expecting exactly `hits` of them.
    pub fn mock_server_error(&mut self, hits: usize) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .with_status(500)
            .with_body("Internal Server Error")
            .expect(hits)
            .create();

        self.mocks.push(mock);
        self
    }

    /// Returns a reference to the underlying mockito server for advanced mocking.
    pub fn get_server(&mut self) -> &mut ServerGuard {
        &mut self.server
    }

    /// Verifies every mock saw its expected number of calls.
    #[must_use]
    pub fn verify_all_called(&self) -> bool {
        self.mocks.iter().all(Mock::matched)
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
    async fn test_unused_open_mocks_verify() {
        let mut mock = RpcMockBuilder::new().await;
        mock.mock_chain_id(5).mock_transaction_count(3);
        assert!(mock.verify_all_called());
    }
}
