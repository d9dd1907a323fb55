//! Request dispatch: local predefined handlers or verbatim forwarding.
//!
//! ```text
//! JsonRpcRequest
//!       │
//!       ├── PredefinedMethod::lookup ── hit ──► handler (pre/post processing) ──► NodePool
//!       │
//!       └── miss ──► NodePool.do_request (body forwarded as-is)
//! ```
//!
//! Node-side JSON-RPC errors come back as a [`DispatchReply`] with `node_error` set; they are
//! not failures of the gateway and never count against an endpoint.

pub mod predefined;

use bytes::Bytes;
use std::{sync::Arc, time::Instant};

use crate::{
    errors::{ErrorSource, GatewayError},
    metrics::{MetricsCollector, ResponseSource},
    types::{JsonRpcRequest, JsonRpcResponse, Network, RpcPayload},
    upstream::{CallContext, NodePool, UpstreamError},
};

pub use predefined::PredefinedMethod;

/// Response body ready for the ingress.
#[derive(Debug, Clone)]
pub struct DispatchReply {
    /// JSON-RPC response bytes; verbatim from the node for forwarded calls.
    pub body: Bytes,
    /// The node answered with a JSON-RPC error (nonzero code).
    pub node_error: bool,
    pub source: ResponseSource,
}

pub struct Dispatcher {
    pool: Arc<NodePool>,
    network: Network,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(pool: Arc<NodePool>, network: Network) -> Self {
        Self { pool, network, metrics: None }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    /// Whether `method` is handled locally.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        PredefinedMethod::lookup(method).is_some()
    }

    /// Runs the predefined handler for `request.method`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MethodNotFound`] without contacting the pool when the method is not
    /// predefined; otherwise whatever the handler returns.
    pub async fn forward(
        &self,
        request: JsonRpcRequest,
        ctx: &CallContext,
    ) -> Result<JsonRpcResponse, GatewayError> {
        let Some(method) = PredefinedMethod::lookup(&request.method) else {
            return Err(GatewayError::MethodNotFound(request.method));
        };
        let id = Arc::clone(&request.id);
        let mut response = method.handle(&self.pool, self.network, request, ctx).await?;
        // Local handlers issue their own node queries; answer with the caller's id.
        response.id = id;
        Ok(response)
    }

    /// Top-level handling of one request, with timing and metrics.
    ///
    /// # Errors
    ///
    /// Any local or transport failure as a [`GatewayError`].
    pub async fn process_request(
        &self,
        request: JsonRpcRequest,
        ctx: &CallContext,
    ) -> Result<DispatchReply, GatewayError> {
        let method = request.method.clone();
        if method.is_empty() {
            return Err(GatewayError::Protocol("missing method".to_string()));
        }

        let start = Instant::now();
        let result = self.handle_request(request, ctx).await;
        let latency_ms: u64 = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

        match &result {
            Ok(reply) => {
                tracing::debug!(
                    method = %method,
                    source = ?reply.source,
                    node_error = reply.node_error,
                    latency_ms,
                    "request dispatched"
                );
            }
            Err(e) => {
                tracing::warn!(method = %method, error = %e, latency_ms, "request failed");
            }
        }

        if let Some(metrics) = &self.metrics {
            let (source, success) = match &result {
                Ok(reply) => (reply.source, !reply.node_error),
                Err(e) => (error_source(e), false),
            };
            metrics.record_request(&method, source, success, latency_ms);
            if let Err(e) = &result {
                metrics.record_gateway_error(e);
            }
        }

        result
    }

    async fn handle_request(
        &self,
        request: JsonRpcRequest,
        ctx: &CallContext,
    ) -> Result<DispatchReply, GatewayError> {
        if self.contains(&request.method) {
            let response = self.forward(request, ctx).await?;
            let body = serde_json::to_vec(&response)
                .map_err(|e| GatewayError::Protocol(format!("unserializable response: {e}")))?;
            return Ok(DispatchReply {
                body: Bytes::from(body),
                node_error: response.is_error(),
                source: ResponseSource::Predefined,
            });
        }

        let payload = RpcPayload::Request(request);
        let body = self.pool.do_request(self.network, &payload, ctx).await?;
        let envelope: JsonRpcResponse = serde_json::from_slice(&body).map_err(|e| {
            GatewayError::Transport(UpstreamError::InvalidResponse(format!(
                "malformed JSON-RPC body: {e}"
            )))
        })?;

        Ok(DispatchReply {
            body,
            node_error: envelope.is_error(),
            source: ResponseSource::Upstream,
        })
    }
}

/// Request label for a failed dispatch.
fn error_source(error: &GatewayError) -> ResponseSource {
    match error.source_side() {
        ErrorSource::Upstream => ResponseSource::Upstream,
        ErrorSource::Gateway => ResponseSource::Gateway,
    }
}
