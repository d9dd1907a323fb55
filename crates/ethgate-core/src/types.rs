//! Wire types shared by the node pool, the dispatcher and the HTTP ingress.
//!
//! # Type Categories
//!
//! ## JSON-RPC Envelope
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: JSON-RPC 2.0 envelope
//! - [`RpcPayload`]: what the node pool accepts, either a pre-serialized body or a request
//!
//! ## Routing
//! - [`Network`]: the `MAIN` / `TEST` tag used to key endpoint lists

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Cow, fmt, str::FromStr, sync::Arc};

use crate::upstream::errors::UpstreamError;

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Id used for requests the gateway builds on its own behalf.
pub const INTERNAL_REQUEST_ID: u64 = 1;

/// Network tag selecting which endpoint list a call goes to.
///
/// Serialized as the upper-case tags `"MAIN"` and `"TEST"`.
///
/// # Example
///
/// ```
/// use ethgate_core::types::Network;
///
/// let network: Network = "TEST".parse().unwrap();
/// assert_eq!(network, Network::Test);
/// assert_eq!(network.to_string(), "TEST");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    Main,
    Test,
}

impl Network {
    /// All known networks, in arena order.
    pub const ALL: [Network; 2] = [Network::Main, Network::Test];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Test => "TEST",
        }
    }

    #[must_use]
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Main => 0,
            Self::Test => 1,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = UpstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MAIN" => Ok(Self::Main),
            "TEST" => Ok(Self::Test),
            _ => Err(UpstreamError::UnknownNetwork(s.to_string())),
        }
    }
}

/// JSON-RPC 2.0 request structure.
///
/// - `jsonrpc`: Uses `Cow<'static, str>` so the static version string costs nothing.
/// - `id`: Uses `Arc<Value>` so the id can be echoed into responses cheaply.
///
/// # Example
///
/// ```
/// use ethgate_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("eth_blockNumber", Some(json!([])), json!(1));
///
/// assert_eq!(request.method, "eth_blockNumber");
/// assert!(request.positional_params().is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default = "default_id")]
    pub id: Arc<Value>,
}

fn default_version() -> Cow<'static, str> {
    JSONRPC_VERSION_COW
}

fn default_id() -> Arc<Value> {
    Arc::new(Value::from(INTERNAL_REQUEST_ID))
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: method.into(), params, id: Arc::new(id) }
    }

    /// Builds the fixed-shape request the gateway uses for its own node queries.
    #[must_use]
    pub fn internal(method: &str, params: Vec<Value>) -> Self {
        Self::new(method, Some(Value::Array(params)), Value::from(INTERNAL_REQUEST_ID))
    }

    /// Positional parameters, or an empty slice when params are absent or by-name.
    #[must_use]
    pub fn positional_params(&self) -> &[Value] {
        match &self.params {
            Some(Value::Array(params)) => params,
            _ => &[],
        }
    }
}

/// JSON-RPC 2.0 response structure.
///
/// Both `result` and `error` are always serialized so the envelope has the same shape the
/// upstream nodes produce.
///
/// # Example
///
/// ```
/// use ethgate_core::types::JsonRpcResponse;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let response = JsonRpcResponse::success(json!("0x1234"), Arc::new(json!(1)));
/// assert!(!response.is_error());
///
/// let response = JsonRpcResponse::error(-32000, "nonce too low".to_string(), Arc::new(json!(1)));
/// assert!(response.is_error());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: Cow<'static, str>,
    #[serde(default)]
    pub id: Arc<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(result: Value, id: Arc<Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, id, result: Some(result), error: None }
    }

    #[must_use]
    pub fn error(code: i32, message: String, id: Arc<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
        }
    }

    /// Returns `true` when the node reported an application error (nonzero code).
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.code != 0)
    }

    /// The result as a string, which is how nodes encode quantities and data.
    #[must_use]
    pub fn result_str(&self) -> Option<&str> {
        self.result.as_ref().and_then(Value::as_str)
    }
}

/// JSON-RPC 2.0 error object.
///
/// Standard codes: `-32700` parse error, `-32600` invalid request, `-32601` method not found,
/// `-32602` invalid params, `-32603` internal error, `-32000..=-32099` server-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Body handed to the node pool.
///
/// `Raw` is forwarded byte-for-byte; `Request` is serialized first. Anything else a caller
/// might hold (numbers, arrays, booleans) is rejected when converting from a JSON value.
#[derive(Debug, Clone)]
pub enum RpcPayload {
    Raw(String),
    Request(JsonRpcRequest),
}

impl RpcPayload {
    /// Serializes the payload into the POST body.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidRequest`] if the request cannot be serialized.
    pub fn to_body(&self) -> Result<bytes::Bytes, UpstreamError> {
        match self {
            Self::Raw(raw) => Ok(bytes::Bytes::from(raw.clone())),
            Self::Request(request) => serde_json::to_vec(request)
                .map(bytes::Bytes::from)
                .map_err(|e| UpstreamError::InvalidRequest(e.to_string())),
        }
    }

    /// Method name for logging; raw payloads are opaque.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Raw(_) => "raw",
            Self::Request(request) => &request.method,
        }
    }
}

impl From<JsonRpcRequest> for RpcPayload {
    fn from(request: JsonRpcRequest) -> Self {
        Self::Request(request)
    }
}

impl TryFrom<Value> for RpcPayload {
    type Error = UpstreamError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(raw) => Ok(Self::Raw(raw)),
            Value::Object(_) => serde_json::from_value(value)
                .map(Self::Request)
                .map_err(|e| UpstreamError::InvalidRequest(format!("malformed request: {e}"))),
            _ => Err(UpstreamError::InvalidRequest("invalid request type".to_string())),
        }
    }
}
