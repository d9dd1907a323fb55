//! JSON-RPC ingress handlers.
//!
//! | Outcome                         | Status | `x-error-source` | Body                      |
//! |---------------------------------|--------|------------------|---------------------------|
//! | Success                         | 200    |                  | node body, verbatim       |
//! | Node returned a JSON-RPC error  | 400    | `upstream`       | node body, verbatim       |
//! | Local or transport failure      | 400    | `gateway`        | `{jsonrpc, id, error}`    |

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ethgate_core::{
    errors::{ErrorSource, GatewayError},
    runtime::GatewayComponents,
    types::{JsonRpcRequest, JsonRpcResponse},
    upstream::CallContext,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::debug;

pub const X_ERROR_SOURCE: &str = "x-error-source";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub components: GatewayComponents,
    /// Deadline for one request, retries included.
    pub request_timeout: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(components: GatewayComponents, request_timeout: Duration) -> Self {
        Self { components, request_timeout }
    }
}

/// `?func=<method>` override.
#[derive(Debug, Default, Deserialize)]
pub struct FuncQuery {
    pub func: Option<String>,
}

/// `POST /` and `POST /?func=<method>`.
pub async fn handle_rpc(
    State(state): State<AppState>,
    Query(query): Query<FuncQuery>,
    body: Bytes,
) -> Response {
    dispatch(&state, &body, query.func).await
}

/// `POST /<func>`.
pub async fn handle_rpc_func(
    State(state): State<AppState>,
    Path(func): Path<String>,
    body: Bytes,
) -> Response {
    dispatch(&state, &body, Some(func)).await
}

async fn dispatch(state: &AppState, body: &[u8], func: Option<String>) -> Response {
    let mut request = match parse_request(body) {
        Ok(request) => request,
        Err((error, id)) => return gateway_error(&error, id),
    };

    if let Some(func) = func.filter(|f| !f.is_empty()) {
        debug!(method = %request.method, func = %func, "method overridden by func");
        request.method = func;
    }

    let id = Arc::clone(&request.id);
    let ctx = CallContext::with_timeout(state.request_timeout);
    match state.components.dispatcher().process_request(request, &ctx).await {
        Ok(reply) if reply.node_error => {
            json_body(StatusCode::BAD_REQUEST, reply.body, Some(ErrorSource::Upstream))
        }
        Ok(reply) => json_body(StatusCode::OK, reply.body, None),
        Err(e) => gateway_error(&e, id),
    }
}

/// Parses one request object. Batches are not supported.
fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, (GatewayError, Arc<Value>)> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        (GatewayError::Protocol(format!("parse error: {e}")), Arc::new(Value::Null))
    })?;

    let id = Arc::new(value.get("id").cloned().unwrap_or(Value::Null));
    match value {
        Value::Array(_) => {
            Err((GatewayError::Protocol("batch requests are not supported".to_string()), id))
        }
        Value::Object(_) => serde_json::from_value(value)
            .map_err(|e| (GatewayError::Protocol(format!("invalid request: {e}")), id)),
        _ => Err((GatewayError::Protocol("request must be a JSON object".to_string()), id)),
    }
}

fn gateway_error(error: &GatewayError, id: Arc<Value>) -> Response {
    let response = JsonRpcResponse::error(error.code(), error.to_string(), id);
    match serde_json::to_vec(&response) {
        Ok(body) => {
            json_body(StatusCode::BAD_REQUEST, Bytes::from(body), Some(error.source_side()))
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn json_body(status: StatusCode, body: Bytes, source: Option<ErrorSource>) -> Response {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(source) = source {
        headers.insert(X_ERROR_SOURCE, HeaderValue::from_static(source.as_str()));
    }
    response
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub network: String,
    pub available: usize,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub network: String,
    pub networks: Vec<NetworkStatus>,
    pub signer: String,
    pub timestamp: String,
}

/// `GET /health`: 200 while the served network has a selectable endpoint, 503 otherwise.
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let network = state.components.dispatcher().network();
    let health = state.components.node_pool().health();
    let serving = health.iter().any(|h| h.network == network && h.available > 0);
    let signer = state.components.key_signer().state();

    let body = HealthResponse {
        status: if serving { "healthy" } else { "unhealthy" }.to_string(),
        network: network.to_string(),
        networks: health
            .into_iter()
            .map(|h| NetworkStatus {
                network: h.network.to_string(),
                available: h.available,
                total: h.total,
            })
            .collect(),
        signer: signer.as_str().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    let status = if serving { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}

/// `GET /metrics`: Prometheus text, or 404 when metrics are disabled.
pub async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.components.metrics_collector() {
        Some(metrics) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.get_prometheus_metrics(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
