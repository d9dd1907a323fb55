//! Runtime lifecycle: the signer start-up task and graceful shutdown.

use crate::{
    abi::TxBuilder,
    config::AppConfig,
    dispatch::Dispatcher,
    metrics::MetricsCollector,
    signer::{KeySigner, KeyStore, SignerState},
    upstream::{CallContext, NodePool},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::GatewayRuntimeBuilder, GatewayComponents};

/// Owns the gateway components and the signer start-up task.
///
/// Shutdown is coordinated through a broadcast channel; [`Self::shutdown`] signals every
/// subscriber and waits for the signer task.
pub struct GatewayRuntime {
    components: GatewayComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    signer_task: Option<JoinHandle<()>>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl GatewayRuntime {
    #[must_use]
    pub fn builder() -> GatewayRuntimeBuilder {
        GatewayRuntimeBuilder::new()
    }

    pub(super) fn new(
        components: GatewayComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
        key_store: Option<Box<dyn KeyStore>>,
        synchronize_signer: bool,
    ) -> Self {
        let signer_task = key_store.map(|store| {
            let handle = Self::start_signer(
                store,
                Arc::clone(components.key_signer()),
                Arc::clone(components.node_pool()),
                &config,
                synchronize_signer,
                shutdown_tx.subscribe(),
            );
            debug!("Signer initialization task started");
            handle
        });

        Self {
            components,
            shutdown_tx,
            config,
            signer_task,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn components(&self) -> &GatewayComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.components.dispatcher()
    }

    #[must_use]
    pub fn node_pool(&self) -> &Arc<NodePool> {
        self.components.node_pool()
    }

    #[must_use]
    pub fn key_signer(&self) -> &Arc<KeySigner> {
        self.components.key_signer()
    }

    #[must_use]
    pub fn tx_builder(&self) -> &Arc<TxBuilder> {
        self.components.tx_builder()
    }

    #[must_use]
    pub fn metrics_collector(&self) -> Option<&Arc<MetricsCollector>> {
        self.components.metrics_collector()
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signals every subscriber and waits for the signer task to stop.
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating gateway runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!(error = %e, "Shutdown signal had no receivers");
        }
        if let Some(signer_task) = self.signer_task {
            match signer_task.await {
                Ok(()) => debug!("Signer task completed"),
                Err(e) if e.is_cancelled() => debug!("Signer task cancelled"),
                Err(e) => error!(error = %e, "Signer task failed"),
            }
        }

        info!("Gateway runtime shutdown complete");
    }

    /// Waits for a shutdown signal on the runtime channel, then performs cleanup.
    pub async fn wait_for_shutdown(self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, runtime terminating");
        self.shutdown().await;
    }

    /// Loads the key, then learns the chain id and starting nonce.
    ///
    /// Abandoned on shutdown; a pending signer then reports unavailable at its deadline.
    fn start_signer(
        store: Box<dyn KeyStore>,
        signer: Arc<KeySigner>,
        pool: Arc<NodePool>,
        config: &AppConfig,
        synchronize: bool,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let chain_id = config.signer.chain_id;
        let network = config.network.target;
        let request_timeout = config.request_timeout();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Signer initialization interrupted by shutdown");
                }
                () = async {
                    let state = signer.initialize(store.as_ref(), chain_id).await;
                    if state != SignerState::Ready || !synchronize {
                        return;
                    }
                    let ctx = CallContext::with_timeout(request_timeout);
                    signer.synchronize(&pool, network, &ctx).await;
                } => {}
            }
        })
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<GatewayRuntime>;
    let _ = assert_sync::<GatewayRuntime>;
};
