//! Contract encoding and the read, node-signed and locally signed write paths.

use crate::mock_infrastructure::{
    pool_for, test_key_bytes, RpcMockBuilder, TEST_ABI, TEST_ADDRESS,
};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{address, Address, U256};
use ethgate_core::{
    abi::{ContractAbi, SignedSubmission, TxBuilder},
    errors::GatewayError,
    signer::KeySigner,
    types::Network,
    upstream::CallContext,
};
use serde_json::json;
use std::{collections::HashSet, sync::Arc, time::Duration};

const TOKEN: Address = address!("00000000000000000000000000000000000000aa");
const RECIPIENT: Address = address!("00000000000000000000000000000000000000bb");
const TX_HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

fn ctx() -> CallContext {
    CallContext::with_timeout(Duration::from_secs(5))
}

fn transfer_args(amount: u64) -> Vec<DynSolValue> {
    vec![DynSolValue::Address(RECIPIENT), DynSolValue::Uint(U256::from(amount), 256)]
}

async fn signed_transfer(
    builder: &TxBuilder,
    abi: &ContractAbi,
    amount: u64,
    ctx: &CallContext,
) -> Result<SignedSubmission, GatewayError> {
    let args = transfer_args(amount);
    let gas_price = U256::from(1_000_000_000u64);
    builder.send_transaction_with_sign(abi, TOKEN, "transfer", &args, 60_000, gas_price, ctx).await
}

fn signing_builder(url: String) -> TxBuilder {
    let pool = pool_for(Network::Test, &[url]);
    let signer = Arc::new(KeySigner::from_secret(&test_key_bytes()).unwrap());
    TxBuilder::new(pool, signer, Network::Test)
}

#[test]
fn test_describe_output_decodes_packed_input() {
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();
    let values = vec![
        DynSolValue::Address(TEST_ADDRESS),
        DynSolValue::Uint(U256::from(1_234_567u64), 256),
        DynSolValue::Bool(true),
        DynSolValue::String("gateway".to_string()),
        DynSolValue::FixedArray(vec![
            DynSolValue::Uint(U256::from(1), 8),
            DynSolValue::Uint(U256::from(2), 8),
            DynSolValue::Uint(U256::from(3), 8),
        ]),
        DynSolValue::Array(vec![
            DynSolValue::Uint(U256::from(10), 64),
            DynSolValue::Uint(U256::from(20), 64),
        ]),
    ];

    let packed = abi.pack("describe", &values).unwrap();
    // Outputs share the input types, so the encoding after the selector decodes back.
    let decoded = abi.unpack("describe", &format!("0x{}", &packed[10..])).unwrap();

    assert_eq!(decoded, values);
}

#[test]
fn test_string_arguments_pack_like_typed_values() {
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();

    let typed = abi.pack("transfer", &transfer_args(500)).unwrap();
    let coerced = abi.pack_strings("transfer", &[&RECIPIENT.to_string(), "500"]).unwrap();

    assert_eq!(typed, coerced);
    assert!(typed.starts_with("0xa9059cbb"));
}

#[tokio::test]
async fn test_call_decodes_return_data() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_call(&format!("0x{:064x}", 1000));

    let builder = signing_builder(mock.url());
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();
    let output = builder
        .call(&abi, TOKEN, "balanceOf", &[DynSolValue::Address(TEST_ADDRESS)], &ctx())
        .await
        .unwrap();

    assert_eq!(output, vec![DynSolValue::Uint(U256::from(1000), 256)]);
}

#[tokio::test]
async fn test_node_signed_send_returns_hash() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_method_times("eth_sendTransaction", &json!(TX_HASH), 1);

    let builder = signing_builder(mock.url());
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();
    let hash = builder
        .send_transaction(&abi, TOKEN, "transfer", &transfer_args(1), 100_000, &ctx())
        .await
        .unwrap();

    assert_eq!(hash, TX_HASH);
    assert!(mock.verify_all_called());
}

#[tokio::test]
async fn test_signed_sends_use_consecutive_nonces() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_chain_id(5).mock_transaction_count(7).mock_send_raw_transaction(TX_HASH, 2);

    let builder = signing_builder(mock.url());
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();

    let first = signed_transfer(&builder, &abi, 1, &ctx()).await.unwrap();
    let second = signed_transfer(&builder, &abi, 2, &ctx()).await.unwrap();

    assert_eq!((first.nonce, second.nonce), (7, 8));
    assert_eq!(first.tx_hash, TX_HASH);
    assert_ne!(first.local_hash, second.local_hash);
    assert!(mock.verify_all_called());
}

#[tokio::test]
async fn test_concurrent_signed_sends_never_reuse_a_nonce() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_chain_id(5).mock_transaction_count(40).mock_send_raw_transaction(TX_HASH, 6);

    let pool = pool_for(Network::Test, &[mock.url()]);
    let signer = Arc::new(KeySigner::from_secret(&test_key_bytes()).unwrap());
    let builder = TxBuilder::new(pool, Arc::clone(&signer), Network::Test);
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();
    let ctx = ctx();

    let sends = (0..6u64).map(|i| signed_transfer(&builder, &abi, i, &ctx));
    let results = futures::future::join_all(sends).await;

    let nonces: HashSet<u64> = results.into_iter().map(|r| r.unwrap().nonce).collect();
    assert_eq!(nonces, (40..46).collect());
    assert_eq!(signer.current_nonce().await.unwrap(), Some(46));
    assert_eq!(signer.credential().await.unwrap().chain_id(), Some(5));
}

#[tokio::test]
async fn test_rejected_broadcast_keeps_nonce() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_chain_id(5)
        .mock_transaction_count(7)
        .mock_rpc_error("eth_sendRawTransaction", -32000, "insufficient funds");

    let pool = pool_for(Network::Test, &[mock.url()]);
    let signer = Arc::new(KeySigner::from_secret(&test_key_bytes()).unwrap());
    let builder = TxBuilder::new(Arc::clone(&pool), Arc::clone(&signer), Network::Test);
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();

    for _ in 0..2 {
        let err = signed_transfer(&builder, &abi, 1, &ctx()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { code: -32000, .. }), "got {err:?}");
    }

    assert_eq!(signer.current_nonce().await.unwrap(), Some(7));
    // A node-level rejection says nothing about endpoint health.
    assert_eq!(pool.failures(Network::Test, &mock.url()), Some(0));
}

#[tokio::test]
async fn test_signed_send_without_key_fails_before_network() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_server_error(0);

    let pool = pool_for(Network::Test, &[mock.url()]);
    let signer = Arc::new(KeySigner::disabled());
    let builder = TxBuilder::new(Arc::clone(&pool), signer, Network::Test);
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();

    let err = signed_transfer(&builder, &abi, 1, &ctx()).await.unwrap_err();

    assert!(matches!(err, GatewayError::Credential(_)));
    assert_eq!(pool.stats().requests, 0);
    assert!(mock.verify_all_called());
}

#[tokio::test]
async fn test_unknown_method_is_decode_error() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_server_error(0);

    let builder = signing_builder(mock.url());
    let abi = ContractAbi::from_json(TEST_ABI).unwrap();
    let err = builder.call(&abi, TOKEN, "mint", &[], &ctx()).await.unwrap_err();

    assert!(matches!(err, GatewayError::Decode(_)));
}
