//! Gateway-level error taxonomy.
//!
//! Component errors ([`UpstreamError`], [`SignerError`], [`AbiError`]) convert into a
//! [`GatewayError`] at the dispatch boundary. Each variant knows its JSON-RPC error code and
//! which side failed, so the ingress can tell callers whether to blame the gateway or the node.

use thiserror::Error;

use crate::{abi::AbiError, signer::SignerError, upstream::UpstreamError};

/// Side of the gateway that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Gateway,
    Upstream,
}

impl ErrorSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Upstream => "upstream",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed envelope or unsupported payload type. Never retried.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// HTTP/IO failure talking to the nodes, surfaced after retries.
    #[error("Transport error: {0}")]
    Transport(#[source] UpstreamError),

    /// Well-formed JSON-RPC error returned by the node.
    #[error("Upstream error {code}: {message}")]
    Upstream { code: i32, message: String },

    /// Key material missing, corrupt or not loaded in time.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Signing pipeline failure; the nonce was not advanced.
    #[error("Signing error: {0}")]
    Signing(String),

    /// ABI pack/unpack failure.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),
}

impl GatewayError {
    /// JSON-RPC error code carried in the response body.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Protocol(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::Decode(_) => -32602,
            Self::Transport(_) => -32603,
            Self::Credential(_) => -32001,
            Self::Signing(_) => -32002,
            Self::Upstream { code, .. } => *code,
        }
    }

    #[must_use]
    pub fn source_side(&self) -> ErrorSource {
        match self {
            Self::Upstream { .. } => ErrorSource::Upstream,
            _ => ErrorSource::Gateway,
        }
    }

    /// Static label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Transport(_) => "transport",
            Self::Upstream { .. } => "upstream",
            Self::Credential(_) => "credential",
            Self::Signing(_) => "signing",
            Self::Decode(_) => "decode",
            Self::MethodNotFound(_) => "method_not_found",
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(error: UpstreamError) -> Self {
        match error {
            UpstreamError::RpcError(code, message) => Self::Upstream { code, message },
            UpstreamError::InvalidRequest(message) => Self::Protocol(message),
            UpstreamError::UnknownNetwork(tag) => Self::Protocol(format!("unknown network {tag}")),
            other => Self::Transport(other),
        }
    }
}

impl From<SignerError> for GatewayError {
    fn from(error: SignerError) -> Self {
        match error {
            SignerError::Upstream(e) => e.into(),
            e if e.is_credential() => Self::Credential(e.to_string()),
            e => Self::Signing(e.to_string()),
        }
    }
}

impl From<AbiError> for GatewayError {
    fn from(error: AbiError) -> Self {
        Self::Decode(error.to_string())
    }
}
