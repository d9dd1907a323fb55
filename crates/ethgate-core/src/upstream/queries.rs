//! Typed node queries built on [`NodePool::send`].
//!
//! Every query uses the fixed request shape `{"jsonrpc":"2.0","id":1}`. A node-side error
//! becomes [`UpstreamError::RpcError`] so callers can tell it apart from transport failures.

use alloy_primitives::{Address, Bytes, U256};
use serde_json::{json, Value};
use std::str::FromStr;

use super::{context::CallContext, pool::NodePool, UpstreamError};
use crate::types::{JsonRpcRequest, Network};

/// Parses a node quantity given as `0x` hex or as a decimal string.
///
/// # Errors
///
/// Returns [`UpstreamError::InvalidResponse`] if the text is neither.
pub fn parse_quantity_u64(text: &str) -> Result<u64, UpstreamError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|e| UpstreamError::InvalidResponse(format!("bad quantity {text:?}: {e}")))
}

fn quantity_str(value: &Value) -> Result<&str, UpstreamError> {
    value
        .as_str()
        .ok_or_else(|| UpstreamError::InvalidResponse(format!("expected string, got {value}")))
}

impl NodePool {
    /// Runs `method` and returns its `result`, surfacing node errors as `RpcError`.
    ///
    /// # Errors
    ///
    /// Transport errors, [`UpstreamError::RpcError`] for a node-side error, or
    /// [`UpstreamError::InvalidResponse`] when the result is missing.
    pub async fn query(
        &self,
        network: Network,
        method: &str,
        params: Vec<Value>,
        ctx: &CallContext,
    ) -> Result<Value, UpstreamError> {
        let request = JsonRpcRequest::internal(method, params);
        let response = self.send(network, &request, ctx).await?;

        if let Some(error) = response.error.filter(|e| e.code != 0) {
            return Err(UpstreamError::RpcError(error.code, error.message));
        }
        response
            .result
            .ok_or_else(|| UpstreamError::InvalidResponse(format!("{method} returned no result")))
    }

    /// `eth_call` against the latest block; returns the raw return data.
    ///
    /// # Errors
    ///
    /// See [`Self::query`].
    pub async fn call(
        &self,
        network: Network,
        to: Address,
        data: &Bytes,
        ctx: &CallContext,
    ) -> Result<String, UpstreamError> {
        let params =
            vec![json!({ "to": to.to_string(), "data": data.to_string() }), json!("latest")];
        let result = self.query(network, "eth_call", params, ctx).await?;
        quantity_str(&result).map(str::to_string)
    }

    /// `eth_getCode` at the latest block.
    ///
    /// # Errors
    ///
    /// See [`Self::query`].
    pub async fn get_code(
        &self,
        network: Network,
        address: Address,
        ctx: &CallContext,
    ) -> Result<String, UpstreamError> {
        let params = vec![json!(address.to_string()), json!("latest")];
        let result = self.query(network, "eth_getCode", params, ctx).await?;
        quantity_str(&result).map(str::to_string)
    }

    /// Chain id as reported by `net_version`.
    ///
    /// # Errors
    ///
    /// See [`Self::query`]; also fails if the version is not a number.
    pub async fn chain_id(
        &self,
        network: Network,
        ctx: &CallContext,
    ) -> Result<u64, UpstreamError> {
        let result = self.query(network, "net_version", vec![], ctx).await?;
        parse_quantity_u64(quantity_str(&result)?)
    }

    /// # Errors
    ///
    /// See [`Self::query`].
    pub async fn gas_price(
        &self,
        network: Network,
        ctx: &CallContext,
    ) -> Result<U256, UpstreamError> {
        let result = self.query(network, "eth_gasPrice", vec![], ctx).await?;
        let text = quantity_str(&result)?;
        U256::from_str(text)
            .map_err(|e| UpstreamError::InvalidResponse(format!("bad gas price {text:?}: {e}")))
    }

    /// Transaction count of `address` at the latest block, which is its next nonce.
    ///
    /// # Errors
    ///
    /// See [`Self::query`].
    pub async fn transaction_count(
        &self,
        network: Network,
        address: Address,
        ctx: &CallContext,
    ) -> Result<u64, UpstreamError> {
        let params = vec![json!(address.to_string()), json!("latest")];
        let result = self.query(network, "eth_getTransactionCount", params, ctx).await?;
        parse_quantity_u64(quantity_str(&result)?)
    }

    /// `eth_sendTransaction`, signed by the node's own account; returns the tx hash.
    ///
    /// # Errors
    ///
    /// See [`Self::query`].
    pub async fn send_transaction(
        &self,
        network: Network,
        from: Option<Address>,
        to: Address,
        gas: u64,
        data: &Bytes,
        ctx: &CallContext,
    ) -> Result<String, UpstreamError> {
        let mut tx = json!({
            "to": to.to_string(),
            "gas": format!("{gas:#x}"),
            "data": data.to_string(),
        });
        if let (Some(from), Some(object)) = (from, tx.as_object_mut()) {
            object.insert("from".to_string(), json!(from.to_string()));
        }
        let result = self.query(network, "eth_sendTransaction", vec![tx], ctx).await?;
        quantity_str(&result).map(str::to_string)
    }

    /// Broadcasts an RLP-encoded signed transaction; returns the tx hash.
    ///
    /// # Errors
    ///
    /// See [`Self::query`].
    pub async fn send_raw_transaction(
        &self,
        network: Network,
        raw: &Bytes,
        ctx: &CallContext,
    ) -> Result<String, UpstreamError> {
        let result =
            self.query(network, "eth_sendRawTransaction", vec![json!(raw.to_string())], ctx).await?;
        quantity_str(&result).map(str::to_string)
    }
}
