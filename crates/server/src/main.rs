use anyhow::Result;
use axum::serve;
use clap::Parser;
use ethgate_core::{
    config::{AppConfig, SignerSource},
    runtime::GatewayRuntime,
};
use rustls::crypto::{ring::default_provider, CryptoProvider};
use server::app::{create_app, init_logging, shutdown_signal};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Ethereum JSON-RPC gateway.
#[derive(Debug, Parser)]
#[command(name = "server", version, about)]
struct Cli {
    /// Configuration file; defaults to `ETHGATE_CONFIG` or `config/config.toml`.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Encrypted keystore file holding the operator key.
    #[arg(long, env = "KEY_PATH")]
    key_path: Option<String>,

    /// Passphrase for the keystore file.
    #[arg(long, env = "KEY_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path),
            None => AppConfig::load(),
        }
        .map_err(|e| anyhow::anyhow!("Configuration load failed: {e}"))?;

        if self.key_path.is_some() || self.passphrase.is_some() {
            config.signer.source = SignerSource::Keyfile;
            if let Some(path) = &self.key_path {
                config.signer.key_path = Some(path.clone());
            }
            if let Some(passphrase) = &self.passphrase {
                config.signer.passphrase = Some(passphrase.clone());
            }
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CryptoProvider::install_default(default_provider())
        .map_err(|e| anyhow::anyhow!("Failed to install crypto provider: {e:?}"))?;

    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_logging(&config);
    info!("Starting ethgate");
    debug!(
        network = %config.network.target,
        upstreams_count = config.upstreams.providers.len(),
        signer_source = ?config.signer.source,
        bind_port = config.server.bind_port,
        "Configuration loaded"
    );

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    let runtime = GatewayRuntime::builder()
        .with_config(config.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("Runtime initialization failed: {e}"))?;

    let app = create_app(runtime.components().clone(), &config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "RPC server listening");

    if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "Server error occurred");
    }

    runtime.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}
