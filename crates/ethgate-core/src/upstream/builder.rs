//! Builder pattern for constructing a `NodePool` with flexible configuration.

use super::{
    http_client::{HttpClient, HttpClientConfig},
    pool::{NodePool, NodePoolConfig},
};
use crate::{metrics::MetricsCollector, types::Network};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

/// Errors that can occur during node pool construction.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// HTTP client initialization failed
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(String),

    /// Endpoint URL is not an http(s) URL
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
}

/// Builder for constructing a [`NodePool`].
///
/// # Examples
///
/// ```no_run
/// # use ethgate_core::{types::Network, upstream::NodePoolBuilder};
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = NodePoolBuilder::new()
///     .endpoint(Network::Main, "https://node-a.example")
///     .endpoint(Network::Main, "https://node-b.example")
///     .retry_count(3)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct NodePoolBuilder {
    config: NodePoolConfig,
    http_config: HttpClientConfig,
    endpoints: Vec<(Network, String)>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl NodePoolBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: NodePoolConfig::default(),
            http_config: HttpClientConfig::default(),
            endpoints: Vec::new(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: NodePoolConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn endpoint(mut self, network: Network, url: impl Into<String>) -> Self {
        self.endpoints.push((network, url.into()));
        self
    }

    #[must_use]
    pub fn endpoints<I, S>(mut self, network: Network, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints.extend(urls.into_iter().map(|url| (network, url.into())));
        self
    }

    #[must_use]
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.config.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn min_available_endpoints(mut self, floor: usize) -> Self {
        self.config.min_available_endpoints = floor;
        self
    }

    /// Sets HTTP client concurrency limit (default: 512).
    #[must_use]
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.http_config.concurrent_limit = limit;
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the `NodePool`.
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::InvalidEndpoint` for a URL that is not http(s).
    /// Returns `BuilderError::HttpClientInit` if HTTP client initialization fails.
    pub fn build(self) -> Result<NodePool, BuilderError> {
        if let Some((_, url)) = self
            .endpoints
            .iter()
            .find(|(_, url)| !(url.starts_with("http://") || url.starts_with("https://")))
        {
            return Err(BuilderError::InvalidEndpoint(url.clone()));
        }

        let http_client = Arc::new(
            HttpClient::with_config(self.http_config)
                .map_err(|e| BuilderError::HttpClientInit(e.to_string()))?,
        );

        let mut pool = NodePool::new(self.config, http_client);
        if let Some(metrics) = self.metrics {
            pool = pool.with_metrics(metrics);
        }
        for (network, url) in self.endpoints {
            pool.add_endpoint(network, url);
        }

        Ok(pool)
    }
}

impl Default for NodePoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
