//! Methods the gateway implements locally instead of forwarding verbatim.

use ahash::AHashMap;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::{
    errors::GatewayError,
    types::{JsonRpcRequest, JsonRpcResponse, Network},
    units,
    upstream::{CallContext, NodePool},
};

/// Closed set of locally handled methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedMethod {
    /// `eth_getBalance` with an optional third parameter naming the output unit.
    GetBalance,
}

static PREDEFINED_METHODS: LazyLock<AHashMap<&'static str, PredefinedMethod>> =
    LazyLock::new(|| AHashMap::from_iter([("eth_getBalance", PredefinedMethod::GetBalance)]));

impl PredefinedMethod {
    #[must_use]
    pub fn lookup(method: &str) -> Option<Self> {
        PREDEFINED_METHODS.get(method).copied()
    }

    #[must_use]
    pub fn method_name(self) -> &'static str {
        match self {
            Self::GetBalance => "eth_getBalance",
        }
    }

    /// Runs the handler; the returned response may carry a node-side error.
    ///
    /// # Errors
    ///
    /// Protocol errors for bad parameters and transport errors from the pool.
    pub async fn handle(
        self,
        pool: &NodePool,
        network: Network,
        request: JsonRpcRequest,
        ctx: &CallContext,
    ) -> Result<JsonRpcResponse, GatewayError> {
        match self {
            Self::GetBalance => get_balance(pool, network, request, ctx).await,
        }
    }
}

async fn get_balance(
    pool: &NodePool,
    network: Network,
    mut request: JsonRpcRequest,
    ctx: &CallContext,
) -> Result<JsonRpcResponse, GatewayError> {
    let mut params = request.positional_params().to_vec();
    let unit = if params.len() > 2 {
        let unit = match params.swap_remove(2) {
            Value::String(unit) => unit,
            other => {
                return Err(GatewayError::Protocol(format!("unit must be a string, got {other}")))
            }
        };
        params.truncate(2);
        request.params = Some(Value::Array(params));
        Some(unit)
    } else {
        None
    };

    let mut response = pool.send(network, &request, ctx).await?;

    let Some(unit) = unit else {
        return Ok(response);
    };
    if response.is_error() {
        return Ok(response);
    }
    if let Some(raw) = response.result_str() {
        match units::from_wei(raw, &unit) {
            Ok(converted) => response.result = Some(Value::String(converted)),
            Err(e) => debug!(unit = %unit, error = %e, "balance left in wei"),
        }
    }
    Ok(response)
}
