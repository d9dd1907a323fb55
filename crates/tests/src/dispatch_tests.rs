//! Dispatcher behaviour: predefined handlers and verbatim passthrough.

use crate::mock_infrastructure::{pool_for, RpcMockBuilder, TEST_ADDRESS};
use ethgate_core::{
    dispatch::Dispatcher,
    errors::GatewayError,
    metrics::ResponseSource,
    types::{JsonRpcRequest, JsonRpcResponse, Network},
    upstream::CallContext,
};
use mockito::Matcher;
use serde_json::{json, Value};
use std::sync::Arc;

fn get_balance(params: Value) -> JsonRpcRequest {
    JsonRpcRequest::new("eth_getBalance", Some(params), json!(42))
}

#[tokio::test]
async fn test_get_balance_converts_to_requested_unit() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_balance("1000000000000000000");
    let dispatcher = Dispatcher::new(pool_for(Network::Main, &[node.url()]), Network::Main);

    let request = get_balance(json!([TEST_ADDRESS.to_string(), "latest", "ether"]));
    let response = dispatcher.forward(request, &CallContext::background()).await.unwrap();

    assert_eq!(response.result, Some(json!("1")));
    assert!(!response.is_error());
}

#[tokio::test]
async fn test_get_balance_strips_unit_before_forwarding() {
    let mut node = RpcMockBuilder::new().await;
    let strict = node
        .get_server()
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "method": "eth_getBalance",
            "params": [TEST_ADDRESS.to_string(), "latest"],
        })))
        .with_body(r#"{"jsonrpc":"2.0","id":42,"result":"0x1bc16d674ec80000"}"#)
        .create_async()
        .await;
    let dispatcher = Dispatcher::new(pool_for(Network::Main, &[node.url()]), Network::Main);

    let request = get_balance(json!([TEST_ADDRESS.to_string(), "latest", "gwei"]));
    let response = dispatcher.forward(request, &CallContext::background()).await.unwrap();

    assert_eq!(response.result, Some(json!("2000000000")));
    strict.assert_async().await;
}

#[tokio::test]
async fn test_get_balance_without_unit_is_raw_wei() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_balance("0x1bc16d674ec80000");
    let dispatcher = Dispatcher::new(pool_for(Network::Main, &[node.url()]), Network::Main);

    let request = get_balance(json!([TEST_ADDRESS.to_string(), "latest"]));
    let response = dispatcher.forward(request, &CallContext::background()).await.unwrap();

    assert_eq!(response.result, Some(json!("0x1bc16d674ec80000")));
}

#[tokio::test]
async fn test_get_balance_answers_with_caller_id() {
    let mut node = RpcMockBuilder::new().await;
    let _node_id = node
        .get_server()
        .mock("POST", "/")
        .with_body(r#"{"jsonrpc":"2.0","id":7,"result":"0x1bc16d674ec80000"}"#)
        .create_async()
        .await;
    let dispatcher = Dispatcher::new(pool_for(Network::Main, &[node.url()]), Network::Main);

    let request = get_balance(json!([TEST_ADDRESS.to_string(), "latest", "ether"]));
    let response = dispatcher.forward(request, &CallContext::background()).await.unwrap();

    assert_eq!(*response.id, json!(42));
    assert_eq!(response.result, Some(json!("2")));
}

#[tokio::test]
async fn test_get_balance_node_error_is_untouched() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_rpc_error("eth_getBalance", -32602, "invalid address");
    let dispatcher = Dispatcher::new(pool_for(Network::Main, &[node.url()]), Network::Main);

    let request = get_balance(json!(["0xnot-an-address", "latest", "ether"]));
    let reply = dispatcher.process_request(request, &CallContext::background()).await.unwrap();

    assert!(reply.node_error);
    assert_eq!(reply.source, ResponseSource::Predefined);
    let response: JsonRpcResponse = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(response.error.unwrap().message, "invalid address");
}

#[tokio::test]
async fn test_get_balance_rejects_non_string_unit() {
    let node = RpcMockBuilder::new().await;
    let pool = pool_for(Network::Main, &[node.url()]);
    let dispatcher = Dispatcher::new(Arc::clone(&pool), Network::Main);

    let request = get_balance(json!([TEST_ADDRESS.to_string(), "latest", 18]));
    let err = dispatcher.forward(request, &CallContext::background()).await.unwrap_err();

    assert!(matches!(err, GatewayError::Protocol(_)));
    assert_eq!(pool.stats().requests, 0);
}

#[tokio::test]
async fn test_forward_unregistered_method_never_reaches_pool() {
    let node = RpcMockBuilder::new().await;
    let pool = pool_for(Network::Main, &[node.url()]);
    let dispatcher = Dispatcher::new(Arc::clone(&pool), Network::Main);

    let request = JsonRpcRequest::new("eth_sendTransaction", Some(json!([])), json!(1));
    let err = dispatcher.forward(request, &CallContext::background()).await.unwrap_err();

    assert!(matches!(err, GatewayError::MethodNotFound(_)));
    assert_eq!(err.code(), -32601);
    assert_eq!(pool.stats().requests, 0);
}

#[tokio::test]
async fn test_passthrough_body_is_verbatim() {
    let mut node = RpcMockBuilder::new().await;
    let raw = r#"{"jsonrpc":"2.0","id":"abc","result":{"number":"0x10","extra":[1,2]}}"#;
    let _mock = node.get_server().mock("POST", "/").with_body(raw).create_async().await;
    let dispatcher = Dispatcher::new(pool_for(Network::Test, &[node.url()]), Network::Test);

    let request =
        JsonRpcRequest::new("eth_getBlockByNumber", Some(json!(["0x10", false])), json!("abc"));
    let reply = dispatcher.process_request(request, &CallContext::background()).await.unwrap();

    assert_eq!(&reply.body[..], raw.as_bytes());
    assert_eq!(reply.source, ResponseSource::Upstream);
    assert!(!reply.node_error);
}

#[tokio::test]
async fn test_passthrough_garbage_body_is_transport_error() {
    let mut node = RpcMockBuilder::new().await;
    let _mock =
        node.get_server().mock("POST", "/").with_body("<html>oops</html>").create_async().await;
    let dispatcher = Dispatcher::new(pool_for(Network::Main, &[node.url()]), Network::Main);

    let request = JsonRpcRequest::new("eth_blockNumber", None, json!(1));
    let err = dispatcher.process_request(request, &CallContext::background()).await.unwrap_err();

    assert!(matches!(err, GatewayError::Transport(_)));
}
