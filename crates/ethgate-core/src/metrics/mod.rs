//! Prometheus metrics for the gateway.
//!
//! All recording goes through the `metrics` facade macros, which are lock-free atomic
//! operations once the recorder is installed. The recorder is process-wide; every
//! [`MetricsCollector`] shares the same handle so building several runtimes in one process
//! (tests) does not fail.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::{errors::GatewayError, types::Network, upstream::UpstreamError};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "using fallback Prometheus recorder, metrics may not be globally visible"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Where a response came from, for request labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Predefined,
    Upstream,
    /// Failed locally before or instead of a node answer.
    Gateway,
}

impl ResponseSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Predefined => "predefined",
            Self::Upstream => "upstream",
            Self::Gateway => "gateway",
        }
    }
}

pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    /// Record one dispatched request.
    ///
    /// Method names come from clients, so only a fixed set is used as a label value.
    pub fn record_request(
        &self,
        method: &str,
        source: ResponseSource,
        success: bool,
        latency_ms: u64,
    ) {
        let method = method_label(method);
        let source = source.as_str();
        counter!("gateway_requests_total", "method" => method, "source" => source).increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("gateway_request_duration_seconds", "method" => method)
            .record(latency_ms as f64 / 1000.0);
        if !success {
            counter!("gateway_requests_error_total", "method" => method, "source" => source)
                .increment(1);
        }
    }

    pub fn record_gateway_error(&self, error: &GatewayError) {
        counter!("gateway_errors_total", "kind" => error.kind()).increment(1);
    }

    pub fn record_endpoint_failure(&self, network: Network, error: &UpstreamError) {
        counter!(
            "upstream_failures_total",
            "network" => network.as_str(),
            "error_type" => error.as_str()
        )
        .increment(1);
    }

    pub fn record_endpoint_eviction(&self, network: Network, available_len: usize) {
        counter!("upstream_evictions_total", "network" => network.as_str()).increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!("upstream_available_endpoints", "network" => network.as_str())
            .set(available_len as f64);
    }

    pub fn record_available_endpoints(&self, network: Network, available_len: usize) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("upstream_available_endpoints", "network" => network.as_str())
            .set(available_len as f64);
    }

    pub fn record_retry(&self, network: Network, attempt: u32) {
        counter!(
            "upstream_retries_total",
            "network" => network.as_str(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    pub fn record_nonce(&self, committed: bool) {
        let outcome = if committed { "committed" } else { "rolled_back" };
        counter!("signer_nonce_operations_total", "outcome" => outcome).increment(1);
    }

    pub fn record_signer_ready(&self, ready: bool) {
        gauge!("signer_ready").set(if ready { 1.0 } else { 0.0 });
    }

    /// Current metrics in the Prometheus text format.
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn method_label(method: &str) -> &'static str {
    match method {
        "eth_getBalance" => "eth_getBalance",
        "eth_call" => "eth_call",
        "eth_sendRawTransaction" => "eth_sendRawTransaction",
        "eth_sendTransaction" => "eth_sendTransaction",
        "eth_getTransactionCount" => "eth_getTransactionCount",
        "eth_getCode" => "eth_getCode",
        "eth_gasPrice" => "eth_gasPrice",
        "eth_blockNumber" => "eth_blockNumber",
        "eth_chainId" => "eth_chainId",
        "net_version" => "net_version",
        _ => "other",
    }
}
