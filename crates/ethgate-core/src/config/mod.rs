//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: set on the `config` builder and in `Default` implementations
//! 2. **Config file**: TOML file specified by the `ETHGATE_CONFIG` env var
//! 3. **Environment variables**: `ETHGATE__*` env vars override any field
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP ingress settings (bind address, limits, request deadline)
//! - [`NetworkConfig`]: which network tag requests are served from
//! - [`UpstreamProvider`]: node endpoints, each tagged `MAIN` or `TEST`
//! - [`PoolConfig`]: retry budget, failure threshold, HTTP timeout
//! - [`SignerConfig`]: where the operator key comes from
//! - [`MetricsConfig`]: Prometheus endpoint
//! - [`LoggingConfig`]: Log level and format
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! bind_port = 8545
//!
//! [network]
//! target = "TEST"
//!
//! [[upstreams.providers]]
//! name = "local"
//! network = "TEST"
//! url = "http://127.0.0.1:8546"
//!
//! [signer]
//! source = "keyfile"
//! key_path = "/etc/ethgate/key.json"
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

use crate::{types::Network, upstream::NodePoolConfig};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `0.0.0.0`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Defaults to `8545`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Maximum number of requests handled at once. Defaults to `256`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Deadline for one request, including retries. Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Largest accepted request body in bytes. Defaults to 1 MiB.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8545
}

fn default_max_concurrent_requests() -> usize {
    256
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network requests are served from. Defaults to `MAIN`.
    #[serde(default = "default_target")]
    pub target: Network,
}

fn default_target() -> Network {
    Network::Main
}

/// One upstream node endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamProvider {
    /// Human-readable identifier, used in logs only.
    pub name: String,

    pub network: Network,

    /// HTTP(S) JSON-RPC endpoint. Often embeds an API key, so it is never logged.
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamsConfig {
    #[serde(default)]
    pub providers: Vec<UpstreamProvider>,
}

/// Node pool tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Total attempts per request. Defaults to `3`.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Failures an endpoint may accumulate before eviction. Defaults to `10`.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Per-attempt HTTP timeout. Defaults to `5`.
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    /// Outbound concurrency limit shared by all endpoints. Defaults to `512`.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Eviction never leaves fewer selectable endpoints than this. Defaults to `1`.
    #[serde(default = "default_min_available_endpoints")]
    pub min_available_endpoints: usize,
}

fn default_retry_count() -> u32 {
    3
}

fn default_failure_threshold() -> u32 {
    10
}

fn default_http_timeout_seconds() -> u64 {
    5
}

fn default_concurrency_limit() -> usize {
    512
}

fn default_min_available_endpoints() -> usize {
    1
}

/// Where the operator key comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerSource {
    /// No key; signing paths fail closed.
    #[default]
    None,
    /// Encrypted keystore file plus passphrase.
    Keyfile,
    /// AES-256-GCM triple (`secret_key`, `nonce`, `ciphertext`); a keystore document inside
    /// it is unlocked with `passphrase`.
    Encrypted,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub source: SignerSource,

    #[serde(default)]
    pub key_path: Option<String>,

    #[serde(default)]
    pub passphrase: Option<String>,

    /// Hex AES-256 key of the encrypted triple.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Hex 12-byte AES-GCM nonce of the encrypted triple.
    #[serde(default)]
    pub nonce: Option<String>,

    /// Hex ciphertext of the encrypted triple.
    #[serde(default)]
    pub ciphertext: Option<String>,

    /// Chain id to sign for. Learned from the node when absent.
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// How long signing callers wait for the key to load. Defaults to `1000`.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
}

fn default_init_timeout_ms() -> u64 {
    1000
}

impl std::fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerConfig")
            .field("source", &self.source)
            .field("key_path", &self.key_path)
            .field("chain_id", &self.chain_id)
            .field("init_timeout_ms", &self.init_timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Prometheus metrics configuration.
///
/// When enabled, metrics are exposed at `/metrics` on the main listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled. Defaults to `true`.
    pub enabled: bool,
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub upstreams: UpstreamsConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub signer: SignerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { target: default_target() }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            failure_threshold: default_failure_threshold(),
            http_timeout_seconds: default_http_timeout_seconds(),
            concurrency_limit: default_concurrency_limit(),
            min_available_endpoints: default_min_available_endpoints(),
        }
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            source: SignerSource::None,
            key_path: None,
            passphrase: None,
            secret_key: None,
            nonce: None,
            ciphertext: None,
            chain_id: None,
            init_timeout_ms: default_init_timeout_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            network: NetworkConfig::default(),
            upstreams: UpstreamsConfig::default(),
            pool: PoolConfig::default(),
            signer: SignerConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `ETHGATE__` prefix can override any configuration
    /// value. Use `__` as a separator for nested fields (e.g.,
    /// `ETHGATE__SERVER__BIND_PORT=8080`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("server.bind_address", default_bind_address())?
            .set_default("server.bind_port", i64::from(default_bind_port()))?
            .set_default("network.target", "MAIN")?
            .set_default("pool.retry_count", i64::from(default_retry_count()))?
            .set_default("pool.failure_threshold", i64::from(default_failure_threshold()))?
            .set_default("pool.http_timeout_seconds", 5)?
            .set_default("signer.source", "none")?
            .set_default("signer.init_timeout_ms", 1000)?
            .set_default("metrics.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("ETHGATE").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `ETHGATE_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("ETHGATE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed into a valid [`SocketAddr`].
    ///
    /// [`SocketAddr`]: std::net::SocketAddr
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    #[must_use]
    pub fn signer_init_timeout(&self) -> Duration {
        Duration::from_millis(self.signer.init_timeout_ms)
    }

    /// Node pool tunables derived from the `pool` section.
    #[must_use]
    pub fn pool_config(&self) -> NodePoolConfig {
        NodePoolConfig {
            failure_threshold: self.pool.failure_threshold,
            retry_count: self.pool.retry_count,
            request_timeout: Duration::from_secs(self.pool.http_timeout_seconds),
            min_available_endpoints: self.pool.min_available_endpoints,
        }
    }

    /// Endpoint URLs configured for `network`, in file order.
    pub fn provider_urls(&self, network: Network) -> impl Iterator<Item = &str> {
        self.upstreams
            .providers
            .iter()
            .filter(move |p| p.network == network)
            .map(|p| p.url.as_str())
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// Checks include:
    /// - The target network has at least one provider
    /// - All URLs are http(s)
    /// - Retry count and timeouts are greater than zero
    /// - A `keyfile` signer names a key path
    /// - Logging format is either `"json"` or `"pretty"`
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_urls(self.network.target).next().is_none() {
            return Err(format!(
                "No upstream endpoints configured for network {}",
                self.network.target
            ));
        }

        for provider in &self.upstreams.providers {
            if !(provider.url.starts_with("http://") || provider.url.starts_with("https://")) {
                return Err(format!("Invalid URL for upstream {}", provider.name));
            }
        }

        if self.pool.retry_count == 0 {
            return Err("Retry count must be greater than 0".to_string());
        }

        if self.pool.http_timeout_seconds == 0 {
            return Err("HTTP timeout must be greater than 0".to_string());
        }

        if self.server.request_timeout_seconds == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.signer.source == SignerSource::Keyfile && self.signer.key_path.is_none() {
            return Err("Keyfile signer requires signer.key_path".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
