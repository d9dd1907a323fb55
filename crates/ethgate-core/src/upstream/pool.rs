//! Per-network endpoint pool with failure accounting and bounded retry.
//!
//! ```text
//!          do_request(network, payload, ctx)
//!                       │
//!        ┌──────────────▼──────────────┐
//!        │ ctx.ensure_active()         │◄──────────────┐
//!        │ select_endpoint (read lock) │               │
//!        │ POST (clipped timeout)      │               │
//!        └──────────────┬──────────────┘               │
//!             ok ───────┤                              │ attempts left
//!                       │ POST failure                 │
//!                       ├──► record_failure (write) ───┤
//!                       │ body read failure ───────────┘
//!                       ▼
//!            RetriesExhausted { last error }
//! ```
//!
//! Selection only needs a consistent upper bound, so it copies one URL out under the read
//! lock and releases it before any I/O. Eviction happens entirely under the write lock of the
//! affected network; the two networks never contend.

use bytes::Bytes;
use parking_lot::RwLock;
use rand::Rng;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, info, warn};

use super::{
    arena::{EndpointArena, FailureOutcome},
    context::CallContext,
    http_client::HttpClient,
    UpstreamError,
};
use crate::{
    metrics::MetricsCollector,
    types::{JsonRpcRequest, JsonRpcResponse, Network, RpcPayload},
};

/// Tunables for the node pool.
#[derive(Debug, Clone)]
pub struct NodePoolConfig {
    /// Failures an endpoint may accumulate before it is evicted on the next one.
    pub failure_threshold: u32,
    /// Total attempts per request, including the first.
    pub retry_count: u32,
    /// Per-attempt HTTP timeout.
    pub request_timeout: Duration,
    /// Eviction never shrinks a network's selectable prefix below this length.
    pub min_available_endpoints: usize,
}

impl Default for NodePoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            retry_count: 3,
            request_timeout: Duration::from_secs(5),
            min_available_endpoints: 1,
        }
    }
}

/// Point-in-time counters for the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Calls to [`NodePool::do_request`].
    pub requests: u64,
    /// POSTs issued across all requests.
    pub attempts: u64,
    /// Failures charged to an endpoint.
    pub failures: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    requests: AtomicU64,
    attempts: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of one network's arena for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkHealth {
    pub network: Network,
    pub available: usize,
    pub total: usize,
}

/// Upstream node pool shared by every request handler.
pub struct NodePool {
    arenas: [RwLock<EndpointArena>; 2],
    http_client: Arc<HttpClient>,
    config: NodePoolConfig,
    metrics: Option<Arc<MetricsCollector>>,
    counters: PoolCounters,
}

impl NodePool {
    /// Creates an empty pool; use [`super::NodePoolBuilder`] to load endpoints from config.
    #[must_use]
    pub fn new(config: NodePoolConfig, http_client: Arc<HttpClient>) -> Self {
        Self {
            arenas: [RwLock::new(EndpointArena::default()), RwLock::new(EndpointArena::default())],
            http_client,
            config,
            metrics: None,
            counters: PoolCounters::default(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn config(&self) -> &NodePoolConfig {
        &self.config
    }

    fn arena(&self, network: Network) -> &RwLock<EndpointArena> {
        &self.arenas[network.index()]
    }

    /// Appends an endpoint to a network's selectable prefix.
    pub fn add_endpoint(&self, network: Network, url: impl Into<Arc<str>>) {
        let mut arena = self.arena(network).write();
        arena.push(url);
        let available = arena.available_len();
        drop(arena);

        if let Some(metrics) = &self.metrics {
            metrics.record_available_endpoints(network, available);
        }
    }

    /// Picks a selectable endpoint uniformly at random.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::PoolEmpty`] when the network has no selectable endpoints.
    pub fn select_endpoint(&self, network: Network) -> Result<Arc<str>, UpstreamError> {
        let arena = self.arena(network).read();
        let available = arena.available_len();
        if available == 0 {
            return Err(UpstreamError::PoolEmpty(network));
        }
        let index = rand::thread_rng().gen_range(0..available);
        arena.selectable_url(index).cloned().ok_or(UpstreamError::PoolEmpty(network))
    }

    /// Charges one failure to `url` and evicts it past the threshold.
    pub fn record_failure(&self, network: Network, url: &str) -> FailureOutcome {
        let outcome = self.arena(network).write().record_failure(
            url,
            self.config.failure_threshold,
            self.config.min_available_endpoints,
        );

        match outcome {
            FailureOutcome::Unknown => {}
            FailureOutcome::Counted { failures } => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                debug!(network = %network, url = %url, failures, "endpoint failure recorded");
            }
            FailureOutcome::Evicted { failures, available_len } => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                warn!(
                    network = %network,
                    url = %url,
                    failures,
                    available_len,
                    "endpoint evicted"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_endpoint_eviction(network, available_len);
                }
            }
            FailureOutcome::Retained { failures } => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    network = %network,
                    url = %url,
                    failures,
                    "endpoint over failure threshold kept as last selectable endpoint"
                );
            }
            FailureOutcome::AlreadyEvicted { .. } => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        outcome
    }

    /// Puts every endpoint of `network` back into rotation with a clean failure count.
    pub fn reinstate_all(&self, network: Network) {
        let mut arena = self.arena(network).write();
        arena.reinstate_all();
        let available = arena.available_len();
        drop(arena);

        info!(network = %network, available, "endpoints reinstated");
        if let Some(metrics) = &self.metrics {
            metrics.record_available_endpoints(network, available);
        }
    }

    #[must_use]
    pub fn available_len(&self, network: Network) -> usize {
        self.arena(network).read().available_len()
    }

    #[must_use]
    pub fn endpoint_count(&self, network: Network) -> usize {
        self.arena(network).read().len()
    }

    #[must_use]
    pub fn failures(&self, network: Network, url: &str) -> Option<u32> {
        self.arena(network).read().failures(url)
    }

    #[must_use]
    pub fn health(&self) -> Vec<NetworkHealth> {
        Network::ALL
            .iter()
            .map(|&network| {
                let arena = self.arena(network).read();
                NetworkHealth { network, available: arena.available_len(), total: arena.len() }
            })
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// POSTs `payload` to a selected endpoint of `network`, retrying transient failures.
    ///
    /// POST failures count against the endpoint that produced them. A response whose body
    /// cannot be read is retried from the same budget without being charged.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::InvalidRequest`] if the payload cannot be serialized
    /// - [`UpstreamError::PoolEmpty`] if no endpoint is selectable
    /// - [`UpstreamError::Cancelled`] / [`UpstreamError::DeadlineExceeded`] from `ctx`
    /// - [`UpstreamError::RetriesExhausted`] with the last failure once the budget is spent
    pub async fn do_request(
        &self,
        network: Network,
        payload: &RpcPayload,
        ctx: &CallContext,
    ) -> Result<Bytes, UpstreamError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let body = payload.to_body()?;
        let max_attempts = self.config.retry_count.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            ctx.ensure_active()?;
            let url = self.select_endpoint(network)?;
            let timeout = ctx.attempt_timeout(self.config.request_timeout);

            self.counters.attempts.fetch_add(1, Ordering::Relaxed);
            if attempt > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry(network, attempt);
                }
            }

            match self.http_client.send_request(&url, body.clone(), timeout).await {
                Ok(bytes) => {
                    debug!(
                        network = %network,
                        method = payload.method(),
                        attempt,
                        "upstream request succeeded"
                    );
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() => {
                    if e.penalizes_endpoint() {
                        self.record_failure(network, &url);
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.record_endpoint_failure(network, &e);
                    }
                    debug!(
                        network = %network,
                        method = payload.method(),
                        attempt,
                        error = %e,
                        "upstream attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let source = last_error.unwrap_or(UpstreamError::PoolEmpty(network));
        warn!(
            network = %network,
            method = payload.method(),
            attempts = max_attempts,
            error = %source,
            "upstream retries exhausted"
        );
        Err(UpstreamError::RetriesExhausted { attempts: max_attempts, source: Box::new(source) })
    }

    /// Sends a structured request and parses the JSON-RPC envelope.
    ///
    /// A node-side JSON-RPC error is a successful transport outcome: it comes back as
    /// `Ok` with `error` populated.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Self::do_request`], or [`UpstreamError::InvalidResponse`] if
    /// the body is not a JSON-RPC response.
    pub async fn send(
        &self,
        network: Network,
        request: &JsonRpcRequest,
        ctx: &CallContext,
    ) -> Result<JsonRpcResponse, UpstreamError> {
        let payload = RpcPayload::Request(request.clone());
        let bytes = self.do_request(network, &payload, ctx).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamError::InvalidResponse(format!("malformed JSON-RPC body: {e}")))
    }
}
