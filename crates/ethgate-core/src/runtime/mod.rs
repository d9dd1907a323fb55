//! Gateway runtime initialization and lifecycle management.
//!
//! Turns an [`AppConfig`](crate::config::AppConfig) into the shared components a request
//! handler needs, and owns the background task that loads the operator key.
//!
//! ```text
//! AppConfig ──► GatewayRuntimeBuilder::build
//!                 ├── MetricsCollector      (when metrics.enabled)
//!                 ├── NodePool              (every provider, both networks)
//!                 ├── KeySigner ──spawn──► initialize(key store) ──► synchronize(chain id, nonce)
//!                 ├── Dispatcher            (network.target)
//!                 └── TxBuilder             (network.target)
//! ```
//!
//! The signer task runs concurrently with request serving. Passthrough traffic never waits
//! for it; signing callers wait at most `signer.init_timeout_ms`.
//!
//! # Example
//!
//! ```no_run
//! use ethgate_core::{config::AppConfig, runtime::GatewayRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let runtime = GatewayRuntime::builder().with_config(config).build()?;
//!
//!     let dispatcher = runtime.dispatcher();
//!     // ... set up HTTP routes ...
//!
//!     runtime.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{GatewayRuntimeBuilder, RuntimeError};
pub use components::GatewayComponents;
pub use lifecycle::GatewayRuntime;
