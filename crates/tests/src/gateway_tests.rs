//! End-to-end tests through the HTTP application: ingress, dispatch, pool and health.

use crate::mock_infrastructure::{config_for, RpcMockBuilder};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use ethgate_core::{
    config::{AppConfig, UpstreamProvider},
    runtime::GatewayRuntime,
    types::Network,
};
use serde_json::{json, Value};
use serial_test::serial;
use tower::ServiceExt;

fn app_for(config: &AppConfig) -> (Router, GatewayRuntime) {
    let runtime = GatewayRuntime::builder().with_config(config.clone()).build().unwrap();
    let app = server::app::create_app(runtime.components().clone(), config);
    (app, runtime)
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_of(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_balance_in_ether_over_http() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_balance("0x1bc16d674ec80000");

    let (app, runtime) = app_for(&config_for(Network::Main, &mock.url()));
    let request = json!({
        "jsonrpc": "2.0",
        "method": "ignored",
        "params": ["0x2c7536E3605D9C16a7a3D7b1898e529396a65c23", "latest", "ether"],
        "id": 42
    });

    let response = app.oneshot(post("/eth_getBalance", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["result"], "2");
    assert_eq!(body["id"], 42);
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_failover_hides_dead_node_from_client() {
    let mut dead = RpcMockBuilder::new().await;
    let _dead_mock =
        dead.get_server().mock("POST", "/").with_status(502).expect_at_least(0).create();
    let mut alive = RpcMockBuilder::new().await;
    alive.mock_method("eth_blockNumber", &json!("0x2a"));

    let mut config = config_for(Network::Main, &dead.url());
    config.upstreams.providers.push(UpstreamProvider {
        name: "alive".to_string(),
        network: Network::Main,
        url: alive.url(),
    });
    config.pool.retry_count = 2;
    config.pool.failure_threshold = 0;

    let (app, runtime) = app_for(&config);
    let request = json!({"jsonrpc": "2.0", "method": "eth_blockNumber", "params": [], "id": 1});

    // Selection is random; keep sending until the dead node has been drawn once.
    for _ in 0..64 {
        let response = app.clone().oneshot(post("/", &request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await["result"], "0x2a");
        if runtime.node_pool().available_len(Network::Main) == 1 {
            break;
        }
    }
    assert_eq!(runtime.node_pool().available_len(Network::Main), 1);
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_health_degrades_when_pool_drains() {
    let mut config = config_for(Network::Main, "http://127.0.0.1:1");
    config.pool.retry_count = 1;
    config.pool.failure_threshold = 0;
    config.pool.min_available_endpoints = 0;

    let (app, runtime) = app_for(&config);
    let health = || Request::builder().uri("/health").body(Body::empty()).unwrap();
    assert_eq!(app.clone().oneshot(health()).await.unwrap().status(), StatusCode::OK);

    let request = json!({"jsonrpc": "2.0", "method": "eth_blockNumber", "id": 3});
    let response = app.clone().oneshot(post("/", &request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get("x-error-source").unwrap(), "gateway");

    let response = app.oneshot(health()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_of(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["networks"][0]["available"], 0);
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_config_file_and_env_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.toml");
    std::fs::write(
        &path,
        r#"
[network]
target = "TEST"

[[upstreams.providers]]
name = "local"
network = "TEST"
url = "http://127.0.0.1:8546"

[pool]
retry_count = 2
"#,
    )
    .unwrap();

    std::env::set_var("ETHGATE_CONFIG", &path);
    std::env::set_var("ETHGATE__POOL__RETRY_COUNT", "7");
    let loaded = AppConfig::load();
    std::env::remove_var("ETHGATE__POOL__RETRY_COUNT");
    std::env::remove_var("ETHGATE_CONFIG");

    let config = loaded.unwrap();
    assert_eq!(config.network.target, Network::Test);
    assert_eq!(config.pool.retry_count, 7);
    assert_eq!(config.upstreams.providers.len(), 1);
    assert!(config.validate().is_ok());
}

#[tokio::test]
#[serial]
async fn test_missing_config_file_uses_defaults() {
    std::env::set_var("ETHGATE_CONFIG", "/nonexistent/ethgate.toml");
    let loaded = AppConfig::load();
    std::env::remove_var("ETHGATE_CONFIG");

    let config = loaded.unwrap();
    assert_eq!(config.server.bind_port, 8545);
    assert!(config.upstreams.providers.is_empty());
    assert!(config.validate().is_err());
}
