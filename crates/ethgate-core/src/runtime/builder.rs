//! Builder for initializing the gateway runtime from configuration.

use crate::{
    abi::TxBuilder,
    config::{AppConfig, SignerConfig, SignerSource},
    dispatch::Dispatcher,
    metrics::MetricsCollector,
    signer::{EncryptedKeyStore, KeyFileStore, KeySigner, KeyStore, SignerError},
    types::Network,
    upstream::NodePoolBuilder,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{lifecycle::GatewayRuntime, GatewayComponents};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// No upstreams configured
    #[error("No upstream providers configured")]
    NoUpstreams,

    /// Generic initialization error
    #[error("Runtime initialization failed: {0}")]
    Initialization(String),
}

#[derive(Clone)]
struct RuntimeOptions {
    synchronize_signer: bool,
    shutdown_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { synchronize_signer: true, shutdown_channel_capacity: 16 }
    }
}

/// Builder for constructing a [`GatewayRuntime`].
///
/// # Examples
///
/// ```no_run
/// # use ethgate_core::{config::AppConfig, runtime::GatewayRuntimeBuilder};
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::load()?;
///
/// let runtime = GatewayRuntimeBuilder::new()
///     .with_config(config)
///     .with_shutdown_channel_capacity(32)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct GatewayRuntimeBuilder {
    config: Option<AppConfig>,
    key_store: Option<Box<dyn KeyStore>>,
    options: RuntimeOptions,
}

impl GatewayRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, key_store: None, options: RuntimeOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads the operator key from `store` instead of the `signer` config section.
    #[must_use]
    pub fn with_key_store(mut self, store: Box<dyn KeyStore>) -> Self {
        self.key_store = Some(store);
        self
    }

    /// Skips learning the chain id and nonce after the key loads.
    ///
    /// Both are then learned on the first signed submission.
    #[must_use]
    pub fn disable_signer_sync(mut self) -> Self {
        self.options.synchronize_signer = false;
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds the runtime and spawns the signer initialization task.
    ///
    /// Must be called inside a Tokio runtime. A key that cannot be loaded does not fail the
    /// build; the signer becomes unavailable and passthrough keeps working.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError` if configuration is missing or invalid, no upstreams are
    /// configured, or the node pool cannot be created.
    pub fn build(self) -> Result<GatewayRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        if config.upstreams.providers.is_empty() {
            return Err(RuntimeError::NoUpstreams);
        }

        config.validate().map_err(RuntimeError::ConfigValidation)?;

        let network = config.network.target;
        info!(
            network = %network,
            upstreams_count = config.upstreams.providers.len(),
            signer_source = ?config.signer.source,
            metrics_enabled = config.metrics.enabled,
            "Initializing gateway runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);

        let metrics_collector =
            config.metrics.enabled.then(|| Arc::new(MetricsCollector::new()));
        debug!(enabled = metrics_collector.is_some(), "Metrics collector initialized");

        let mut pool_builder = NodePoolBuilder::new()
            .config(config.pool_config())
            .concurrency_limit(config.pool.concurrency_limit);
        for net in Network::ALL {
            pool_builder = pool_builder.endpoints(net, config.provider_urls(net));
        }
        if let Some(metrics) = &metrics_collector {
            pool_builder = pool_builder.metrics(Arc::clone(metrics));
        }
        let node_pool = Arc::new(
            pool_builder.build().map_err(|e| RuntimeError::Initialization(e.to_string()))?,
        );
        for health in node_pool.health() {
            info!(
                network = %health.network,
                endpoints = health.total,
                "Node pool initialized"
            );
        }

        let key_store = match self.key_store {
            Some(store) => Some(store),
            None => key_store_from_config(&config.signer).unwrap_or_else(|e| {
                warn!(error = %e, "signer key source misconfigured, signing disabled");
                None
            }),
        };
        let (key_signer, key_store) = match key_store {
            Some(store) => (KeySigner::new(config.signer_init_timeout()), Some(store)),
            None => (KeySigner::disabled(), None),
        };
        let key_signer = Arc::new(match &metrics_collector {
            Some(metrics) => key_signer.with_metrics(Arc::clone(metrics)),
            None => key_signer,
        });
        debug!(state = key_signer.state().as_str(), "Key signer created");

        let dispatcher = Dispatcher::new(Arc::clone(&node_pool), network);
        let dispatcher = Arc::new(match &metrics_collector {
            Some(metrics) => dispatcher.with_metrics(Arc::clone(metrics)),
            None => dispatcher,
        });
        let tx_builder =
            Arc::new(TxBuilder::new(Arc::clone(&node_pool), Arc::clone(&key_signer), network));

        let components = GatewayComponents::new(
            metrics_collector,
            node_pool,
            key_signer,
            dispatcher,
            tx_builder,
        );
        let runtime = GatewayRuntime::new(
            components,
            shutdown_tx,
            config,
            key_store,
            self.options.synchronize_signer,
        );

        info!("Gateway runtime initialization complete");

        Ok(runtime)
    }
}

impl Default for GatewayRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Key store named by the `signer` section; `None` when signing is not configured.
///
/// # Errors
///
/// Returns [`SignerError::KeyStore`] when an `encrypted` source lacks a field.
pub fn key_store_from_config(
    signer: &SignerConfig,
) -> Result<Option<Box<dyn KeyStore>>, SignerError> {
    match signer.source {
        SignerSource::None => Ok(None),
        SignerSource::Keyfile => {
            let path = signer
                .key_path
                .clone()
                .ok_or_else(|| SignerError::KeyStore("keyfile source needs key_path".into()))?;
            let passphrase = signer.passphrase.clone().unwrap_or_default();
            Ok(Some(Box::new(KeyFileStore::new(path, passphrase))))
        }
        SignerSource::Encrypted => {
            let store = EncryptedKeyStore::from_parts(
                signer.secret_key.clone(),
                signer.nonce.clone(),
                signer.ciphertext.clone(),
            )?;
            let store = match &signer.passphrase {
                Some(passphrase) => store.with_passphrase(passphrase.clone()),
                None => store,
            };
            Ok(Some(Box::new(store)))
        }
    }
}
