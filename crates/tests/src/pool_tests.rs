//! Node pool behaviour against fake upstream nodes.
//!
//! Covers the failure accounting rules:
//! - transport failures are retried and charged to the endpoint that failed
//! - node-side JSON-RPC errors are returned as-is and never charged
//! - an endpoint is evicted once its failures exceed the threshold, unless it is the last one

use crate::mock_infrastructure::{pool_for, RpcMockBuilder};
use ethgate_core::{
    types::{JsonRpcRequest, JsonRpcResponse, Network, RpcPayload},
    upstream::{CallContext, NodePoolBuilder, UpstreamError},
};
use serde_json::json;
use std::time::Duration;

const DEAD_ENDPOINT: &str = "http://127.0.0.1:1";

fn block_number() -> RpcPayload {
    RpcPayload::Request(JsonRpcRequest::new("eth_blockNumber", Some(json!([])), json!(1)))
}

#[tokio::test]
async fn test_node_error_passes_through_without_penalty() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_rpc_error("eth_blockNumber", -32000, "header not found");
    let pool = pool_for(Network::Main, &[node.url()]);

    let body =
        pool.do_request(Network::Main, &block_number(), &CallContext::background()).await.unwrap();
    let response: JsonRpcResponse = serde_json::from_slice(&body).unwrap();

    assert!(response.is_error());
    assert_eq!(pool.failures(Network::Main, &node.url()), Some(0));
    assert_eq!(pool.stats().attempts, 1);
}

#[tokio::test]
async fn test_node_error_with_http_status_is_not_charged() {
    let mut node = RpcMockBuilder::new().await;
    let _limited = node
        .get_server()
        .mock("POST", "/")
        .with_status(429)
        .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"rate limited"}}"#)
        .expect(1)
        .create_async()
        .await;
    let pool = pool_for(Network::Main, &[node.url()]);

    let body =
        pool.do_request(Network::Main, &block_number(), &CallContext::background()).await.unwrap();
    let response: JsonRpcResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(response.error.map(|e| e.code), Some(-32005));
    assert_eq!(pool.failures(Network::Main, &node.url()), Some(0));
    assert_eq!(pool.stats().attempts, 1);
}

#[tokio::test]
async fn test_server_errors_are_retried_and_charged() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_server_error(3);
    let pool = NodePoolBuilder::new()
        .endpoint(Network::Main, node.url())
        .retry_count(3)
        .build()
        .unwrap();

    let err = pool
        .do_request(Network::Main, &block_number(), &CallContext::background())
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(pool.failures(Network::Main, &node.url()), Some(3));
    assert!(node.verify_all_called());
}

#[tokio::test]
async fn test_eviction_empties_pool_when_floor_is_zero() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_server_error(3);
    let pool = NodePoolBuilder::new()
        .endpoint(Network::Test, node.url())
        .retry_count(3)
        .failure_threshold(2)
        .min_available_endpoints(0)
        .build()
        .unwrap();

    let ctx = CallContext::background();
    assert!(pool.do_request(Network::Test, &block_number(), &ctx).await.is_err());
    assert_eq!(pool.available_len(Network::Test), 0);
    assert_eq!(pool.stats().evictions, 1);

    let err = pool.do_request(Network::Test, &block_number(), &ctx).await.unwrap_err();
    assert!(matches!(err, UpstreamError::PoolEmpty(Network::Test)));

    pool.reinstate_all(Network::Test);
    assert_eq!(pool.available_len(Network::Test), 1);
}

#[tokio::test]
async fn test_last_endpoint_is_retained_by_default() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_server_error(3);
    let pool = NodePoolBuilder::new()
        .endpoint(Network::Main, node.url())
        .retry_count(3)
        .failure_threshold(1)
        .build()
        .unwrap();

    let _ = pool.do_request(Network::Main, &block_number(), &CallContext::background()).await;

    assert_eq!(pool.available_len(Network::Main), 1);
    assert_eq!(pool.stats().evictions, 0);
}

#[tokio::test]
async fn test_failover_evicts_dead_endpoint() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_method("eth_blockNumber", &json!("0x10"));
    let pool = NodePoolBuilder::new()
        .endpoints(Network::Main, [DEAD_ENDPOINT.to_string(), node.url()])
        .retry_count(2)
        .failure_threshold(0)
        .request_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    // Selection is random; keep going until the dead endpoint has been drawn and evicted.
    for _ in 0..64 {
        let body = pool
            .do_request(Network::Main, &block_number(), &CallContext::background())
            .await
            .unwrap();
        let response: JsonRpcResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.result_str(), Some("0x10"));
        if pool.available_len(Network::Main) == 1 {
            break;
        }
    }

    assert_eq!(pool.available_len(Network::Main), 1);
    assert_eq!(pool.stats().evictions, 1);
    for _ in 0..20 {
        assert_eq!(&*pool.select_endpoint(Network::Main).unwrap(), node.url().as_str());
    }
}

#[tokio::test]
async fn test_networks_are_isolated() {
    let mut main = RpcMockBuilder::new().await;
    main.mock_method("eth_blockNumber", &json!("0x1"));
    let pool = pool_for(Network::Main, &[main.url()]);

    let err = pool
        .do_request(Network::Test, &block_number(), &CallContext::background())
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::PoolEmpty(Network::Test)));
    assert_eq!(pool.stats().attempts, 0);
}

#[tokio::test]
async fn test_deadline_stops_retries() {
    let pool = NodePoolBuilder::new()
        .endpoint(Network::Main, DEAD_ENDPOINT)
        .retry_count(u32::MAX)
        .failure_threshold(u32::MAX)
        .build()
        .unwrap();

    let ctx = CallContext::with_timeout(Duration::from_millis(200));
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        pool.do_request(Network::Main, &block_number(), &ctx),
    )
    .await
    .expect("deadline must bound the retry loop");

    assert!(matches!(result, Err(UpstreamError::DeadlineExceeded)));
}

#[tokio::test]
async fn test_cancelled_context_makes_no_attempt() {
    let pool = pool_for(Network::Main, &[DEAD_ENDPOINT.to_string()]);
    let ctx = CallContext::background();
    ctx.token().cancel();

    let err = pool.do_request(Network::Main, &block_number(), &ctx).await.unwrap_err();

    assert!(matches!(err, UpstreamError::Cancelled));
    assert_eq!(pool.stats().attempts, 0);
}
