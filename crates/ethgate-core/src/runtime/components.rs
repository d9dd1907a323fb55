//! Core component container for the gateway runtime.

use crate::{
    abi::TxBuilder, dispatch::Dispatcher, metrics::MetricsCollector, signer::KeySigner,
    upstream::NodePool,
};
use std::sync::Arc;

/// Container for all initialized gateway components.
///
/// All components are wrapped in `Arc` for sharing across request handlers and tasks.
#[derive(Clone)]
pub struct GatewayComponents {
    metrics_collector: Option<Arc<MetricsCollector>>,
    node_pool: Arc<NodePool>,
    key_signer: Arc<KeySigner>,
    dispatcher: Arc<Dispatcher>,
    tx_builder: Arc<TxBuilder>,
}

impl GatewayComponents {
    /// Called by `GatewayRuntimeBuilder` during initialization.
    #[must_use]
    pub fn new(
        metrics_collector: Option<Arc<MetricsCollector>>,
        node_pool: Arc<NodePool>,
        key_signer: Arc<KeySigner>,
        dispatcher: Arc<Dispatcher>,
        tx_builder: Arc<TxBuilder>,
    ) -> Self {
        Self { metrics_collector, node_pool, key_signer, dispatcher, tx_builder }
    }

    /// Returns the metrics collector, or `None` when metrics are disabled.
    #[must_use]
    pub fn metrics_collector(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics_collector.as_ref()
    }

    #[must_use]
    pub fn node_pool(&self) -> &Arc<NodePool> {
        &self.node_pool
    }

    #[must_use]
    pub fn key_signer(&self) -> &Arc<KeySigner> {
        &self.key_signer
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn tx_builder(&self) -> &Arc<TxBuilder> {
        &self.tx_builder
    }
}
