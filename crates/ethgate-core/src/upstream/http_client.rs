use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{types::JsonRpcResponse, upstream::UpstreamError};

/// Configuration for the outbound HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum number of concurrent upstream POSTs.
    pub concurrent_limit: usize,
    /// Permit acquisition timeout in milliseconds.
    pub permit_timeout_ms: u64,
    /// Connect timeout in milliseconds, applied to every new connection.
    pub connect_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self { concurrent_limit: 512, permit_timeout_ms: 500, connect_timeout_ms: 3000 }
    }
}

/// Pooled HTTP client with semaphore-based concurrency control.
///
/// One instance is shared by every network of the node pool, so connections to the same
/// endpoint are reused across requests. It performs a single attempt per call; retry and
/// failure accounting belong to the caller.
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    config: HttpClientConfig,
}

/// RAII guard ensuring semaphore permits are always released.
struct PermitGuard {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl PermitGuard {
    fn new(permit: OwnedSemaphorePermit, semaphore: Arc<Semaphore>) -> Self {
        Self { _permit: permit, semaphore }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        tracing::trace!(
            available_permits = self.semaphore.available_permits(),
            "permit guard dropped"
        );
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Sanitizes network errors so endpoint URLs (which often embed API keys) never reach
    /// clients.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else if error.is_redirect() {
            "too many redirects".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Creates a new HTTP client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(64)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("ethgate/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                UpstreamError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit)),
            config,
        })
    }

    /// Sends one JSON POST and reads the whole body.
    ///
    /// Delivery failures and body-read failures are reported as different variants so the
    /// node pool can decide which of them count against the endpoint.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::ConcurrencyLimit`] if no permit became available in time
    /// - [`UpstreamError::Timeout`] if the POST exceeded `timeout`
    /// - [`UpstreamError::ConnectionFailed`] for other delivery failures
    /// - [`UpstreamError::HttpError`] for non-success HTTP status codes, unless the body is a
    ///   JSON-RPC error envelope, which is returned as-is for the caller to pass through
    /// - [`UpstreamError::BodyRead`] if the body could not be read
    pub async fn send_request(
        &self,
        url: &str,
        body: bytes::Bytes,
        timeout: Duration,
    ) -> Result<bytes::Bytes, UpstreamError> {
        let permit = tokio::time::timeout(
            Duration::from_millis(self.config.permit_timeout_ms),
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                available_permits = self.concurrent_limit.available_permits(),
                "http client semaphore acquisition timeout"
            );
            UpstreamError::ConcurrencyLimit("permit acquisition timed out".to_string())
        })?
        .map_err(|_| UpstreamError::ConcurrencyLimit("semaphore closed".to_string()))?;

        let _permit_guard = PermitGuard::new(permit, self.concurrent_limit.clone());

        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::ConnectionFailed(Self::sanitize_network_error(&e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.bytes().await.unwrap_or_default();
            if is_node_error(&raw) {
                tracing::debug!(status = status.as_u16(), "node error envelope on non-2xx status");
                return Ok(raw);
            }
            let raw_text = String::from_utf8_lossy(&raw).into_owned();
            let sanitized_text = if raw_text.len() > 256 {
                format!("{}... (truncated)", raw_text.chars().take(256).collect::<String>())
            } else {
                raw_text
            };
            return Err(UpstreamError::HttpError(status.as_u16(), sanitized_text));
        }

        response
            .bytes()
            .await
            .map_err(|e| UpstreamError::BodyRead(Self::sanitize_network_error(&e)))
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}

/// A well-formed JSON-RPC response carrying a nonzero error code.
fn is_node_error(body: &[u8]) -> bool {
    serde_json::from_slice::<JsonRpcResponse>(body).is_ok_and(|response| response.is_error())
}
