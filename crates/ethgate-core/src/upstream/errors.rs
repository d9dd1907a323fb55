use thiserror::Error;

use crate::types::Network;

/// Errors that can occur when talking to upstream node endpoints.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Request exceeded the per-call HTTP timeout.
    #[error("Request timeout")]
    Timeout,

    /// The POST could not be delivered (connect/refused/reset).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The endpoint answered with a non-2xx status.
    ///
    /// First field is the HTTP status code, second is the (truncated) body.
    #[error("HTTP error: {0}")]
    HttpError(u16, String),

    /// The POST succeeded but the response body could not be read.
    #[error("Response body unreadable: {0}")]
    BodyRead(String),

    /// JSON-RPC error returned by the node.
    ///
    /// First field is the RPC error code, second is the error message.
    #[error("RPC error {0}: {1}")]
    RpcError(i32, String),

    /// Response from the node could not be parsed or was missing a field.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Every endpoint of the network has been evicted.
    #[error("No selectable endpoints for network {0}")]
    PoolEmpty(Network),

    /// Network tag that is neither `MAIN` nor `TEST`.
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    /// Request payload was malformed or of an unsupported type.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local concurrency limit on outbound requests was reached.
    #[error("Concurrency limit reached: {0}")]
    ConcurrencyLimit(String),

    /// The caller cancelled before the next network call started.
    #[error("Request cancelled")]
    Cancelled,

    /// The caller's deadline passed before the next network call started.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Every attempt failed; carries the last failure.
    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<UpstreamError>,
    },
}

impl UpstreamError {
    /// Returns `true` for failures delivering the POST itself.
    ///
    /// Only these count against an endpoint's failure budget; a body that cannot be read
    /// is retried without penalty.
    #[must_use]
    pub fn penalizes_endpoint(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionFailed(_) | Self::HttpError(_, _))
    }

    /// Returns `true` if another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.penalizes_endpoint() || matches!(self, Self::BodyRead(_))
    }

    /// Returns `true` if this is an HTTP/IO level failure rather than a node or caller error.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::RetriesExhausted { .. } |
            Self::ConcurrencyLimit(_) |
            Self::PoolEmpty(_) |
            Self::InvalidResponse(_) |
            Self::Cancelled |
            Self::DeadlineExceeded => true,
            other => other.is_retryable(),
        }
    }

    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::HttpError(_, _) => "http_error",
            Self::BodyRead(_) => "body_read",
            Self::RpcError(_, _) => "rpc_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::PoolEmpty(_) => "pool_empty",
            Self::UnknownNetwork(_) => "unknown_network",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ConcurrencyLimit(_) => "concurrency_limit",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}
