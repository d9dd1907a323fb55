//! Read and write paths for contract calls.
//!
//! ```text
//! call                      : pack ──► eth_call ──► unpack
//! send_transaction          : pack ──► eth_sendTransaction          (node signs)
//! send_transaction_with_sign: pack ──► ┌ apply_nonce(N) ───────────────────────────┐
//!                                      │ tx{N} ──► sign_tx ──► RLP ──► broadcast   │
//!                                      └ N+1 only if the broadcast succeeded ──────┘
//! ```

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, B256, U256};
use std::sync::Arc;
use tracing::{info, warn};

use super::ContractAbi;
use crate::{
    errors::GatewayError,
    signer::{KeySigner, LegacyTransaction},
    types::Network,
    upstream::{CallContext, NodePool},
};

/// Outcome of a locally signed broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSubmission {
    /// Hash reported by the node.
    pub tx_hash: String,
    pub nonce: u64,
    /// Locally computed hash of the broadcast bytes.
    pub local_hash: B256,
}

/// Builds, signs and submits contract calls against one network.
pub struct TxBuilder {
    pool: Arc<NodePool>,
    signer: Arc<KeySigner>,
    network: Network,
}

impl TxBuilder {
    #[must_use]
    pub fn new(pool: Arc<NodePool>, signer: Arc<KeySigner>, network: Network) -> Self {
        Self { pool, signer, network }
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    /// Read-only contract call; never touches the signer.
    ///
    /// # Errors
    ///
    /// `Decode` for pack/unpack failures, `Transport` or `Upstream` from the node.
    pub async fn call(
        &self,
        abi: &ContractAbi,
        to: Address,
        method: &str,
        args: &[DynSolValue],
        ctx: &CallContext,
    ) -> Result<Vec<DynSolValue>, GatewayError> {
        let data = abi.pack_bytes(method, args)?;
        let output = self.pool.call(self.network, to, &data, ctx).await?;
        Ok(abi.unpack_call(method, args.len(), &output)?)
    }

    /// Contract write signed by the node's own account.
    ///
    /// Uses the operator address as `from` when the signer is already loaded.
    ///
    /// # Errors
    ///
    /// `Decode` for pack failures, `Transport` or `Upstream` from the node.
    pub async fn send_transaction(
        &self,
        abi: &ContractAbi,
        to: Address,
        method: &str,
        args: &[DynSolValue],
        gas: u64,
        ctx: &CallContext,
    ) -> Result<String, GatewayError> {
        let data = abi.pack_bytes(method, args)?;
        let from = self.signer.ready_address();
        Ok(self.pool.send_transaction(self.network, from, to, gas, &data, ctx).await?)
    }

    /// Contract write signed locally and broadcast raw.
    ///
    /// The nonce advances only if the node accepts the broadcast.
    ///
    /// # Errors
    ///
    /// `Decode` for pack failures, `Credential` without a key, `Signing` for signing
    /// failures, `Transport` or `Upstream` from the broadcast.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_transaction_with_sign(
        &self,
        abi: &ContractAbi,
        to: Address,
        method: &str,
        args: &[DynSolValue],
        gas_limit: u64,
        gas_price: U256,
        ctx: &CallContext,
    ) -> Result<SignedSubmission, GatewayError> {
        let data = abi.pack_bytes(method, args)?;

        self.learn_chain_id(ctx).await?;
        let pool = &self.pool;
        let network = self.network;
        self.signer
            .seed_nonce(|address| async move {
                pool.transaction_count(network, address, ctx).await.map_err(GatewayError::from)
            })
            .await?;

        self.signer
            .apply_nonce(|nonce| {
                let data = data.clone();
                async move {
                    self.sign_and_broadcast(nonce, to, gas_limit, gas_price, data, ctx).await
                }
            })
            .await
    }

    async fn sign_and_broadcast(
        &self,
        nonce: u64,
        to: Address,
        gas_limit: u64,
        gas_price: U256,
        data: Bytes,
        ctx: &CallContext,
    ) -> Result<SignedSubmission, GatewayError> {
        let tx = LegacyTransaction { nonce, gas_price, gas_limit, to, value: U256::ZERO, data };
        let signed = self.signer.sign_tx(tx).await?;
        let raw = signed.rlp_bytes();

        let tx_hash = self.pool.send_raw_transaction(self.network, &raw, ctx).await?;
        info!(network = %self.network, nonce, tx_hash = %tx_hash, "signed transaction broadcast");
        Ok(SignedSubmission { tx_hash, nonce, local_hash: signed.hash() })
    }

    /// Learns the chain id once so signatures are replay protected.
    ///
    /// If the node cannot tell, signing falls back to the legacy scheme.
    async fn learn_chain_id(&self, ctx: &CallContext) -> Result<(), GatewayError> {
        let credential = self.signer.credential().await.map_err(GatewayError::from)?;
        if credential.chain_id().is_some() {
            return Ok(());
        }
        match self.pool.chain_id(self.network, ctx).await {
            Ok(chain_id) => {
                self.signer.init_chain_id(chain_id).await?;
                Ok(())
            }
            Err(e) => {
                warn!(
                    network = %self.network,
                    error = %e,
                    "chain id unknown, signing without replay protection"
                );
                Ok(())
            }
        }
    }
}
