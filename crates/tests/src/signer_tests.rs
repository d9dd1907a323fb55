//! Key signer: start-up gate, key sources, signatures and nonce serialization.

use crate::mock_infrastructure::{sealed_test_key, test_key_bytes, TEST_ADDRESS};
use ethgate_core::{
    errors::GatewayError,
    signer::{
        aes, ec_recover, EncryptedKeyStore, KeyFileStore, KeySigner, KeyStore, SignerError,
        SignerState,
    },
};
use std::{sync::Arc, time::Duration};

fn ready_signer() -> Arc<KeySigner> {
    Arc::new(KeySigner::from_secret(&test_key_bytes()).unwrap())
}

#[tokio::test]
async fn test_sign_then_recover_yields_signer_address() {
    let signer = ready_signer();

    let messages: [&[u8]; 3] = [b"", b"hello", &[0xff; 300]];
    for message in messages {
        let signature = signer.sign(message).await.unwrap();
        assert!(signature[64] == 27 || signature[64] == 28);
        assert_eq!(ec_recover(message, &signature).unwrap(), TEST_ADDRESS);
    }
}

#[tokio::test]
async fn test_concurrent_nonce_sections_are_consecutive() {
    let signer = ready_signer();
    signer.init_nonce(10).await.unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let signer = Arc::clone(&signer);
            tokio::spawn(async move {
                signer
                    .apply_nonce(|nonce| async move {
                        tokio::task::yield_now().await;
                        Ok::<u64, SignerError>(nonce)
                    })
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut used = Vec::new();
    for task in tasks {
        used.push(task.await.unwrap());
    }
    used.sort_unstable();

    assert_eq!(used, (10..30).collect::<Vec<_>>());
    assert_eq!(signer.current_nonce().await.unwrap(), Some(30));
}

#[tokio::test]
async fn test_failed_operations_do_not_consume_nonces() {
    let signer = ready_signer();
    signer.init_nonce(3).await.unwrap();

    let tasks: Vec<_> = (0..10u64)
        .map(|i| {
            let signer = Arc::clone(&signer);
            tokio::spawn(async move {
                signer
                    .apply_nonce(|nonce| async move {
                        if i % 2 == 0 {
                            Ok(nonce)
                        } else {
                            Err(SignerError::Signing("broadcast rejected".to_string()))
                        }
                    })
                    .await
            })
        })
        .collect();

    let mut committed = Vec::new();
    for task in tasks {
        if let Ok(nonce) = task.await.unwrap() {
            committed.push(nonce);
        }
    }
    committed.sort_unstable();

    assert_eq!(committed, vec![3, 4, 5, 6, 7]);
    assert_eq!(signer.current_nonce().await.unwrap(), Some(8));
}

#[tokio::test]
async fn test_keystore_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    eth_keystore::encrypt_key(
        dir.path(),
        &mut rand::thread_rng(),
        test_key_bytes(),
        "correct horse",
        Some("operator.json"),
    )
    .unwrap();
    let path = dir.path().join("operator.json");

    let signer = KeySigner::new(Duration::from_secs(5));
    let state = signer.initialize(&KeyFileStore::new(&path, "correct horse"), Some(5)).await;

    assert_eq!(state, SignerState::Ready);
    assert_eq!(signer.address().await.unwrap(), TEST_ADDRESS);
    assert_eq!(signer.credential().await.unwrap().chain_id(), Some(5));
}

#[tokio::test]
async fn test_wrong_passphrase_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    eth_keystore::encrypt_key(
        dir.path(),
        &mut rand::thread_rng(),
        test_key_bytes(),
        "correct horse",
        Some("operator.json"),
    )
    .unwrap();

    let signer = KeySigner::new(Duration::from_secs(5));
    let store = KeyFileStore::new(dir.path().join("operator.json"), "battery staple");
    assert_eq!(signer.initialize(&store, None).await, SignerState::Unavailable);

    let err = GatewayError::from(signer.sign(b"hello").await.unwrap_err());
    assert!(matches!(err, GatewayError::Credential(_)));
}

#[tokio::test]
async fn test_encrypted_keystore_document_with_passphrase() {
    let dir = tempfile::tempdir().unwrap();
    eth_keystore::encrypt_key(
        dir.path(),
        &mut rand::thread_rng(),
        test_key_bytes(),
        "correct horse",
        Some("operator.json"),
    )
    .unwrap();
    let document = std::fs::read(dir.path().join("operator.json")).unwrap();
    let triple = aes::seal(&[9u8; 32], &document).unwrap();

    let signer = KeySigner::new(Duration::from_secs(5));
    let store = EncryptedKeyStore::new(triple.clone()).with_passphrase("correct horse");
    assert_eq!(signer.initialize(&store, None).await, SignerState::Ready);
    assert_eq!(signer.ready_address(), Some(TEST_ADDRESS));

    let wrong = EncryptedKeyStore::new(triple).with_passphrase("battery staple");
    assert!(matches!(wrong.load_key().await, Err(SignerError::KeyStore(_))));
}

#[tokio::test]
async fn test_encrypted_store_loads_key() {
    let signer = KeySigner::new(Duration::from_secs(1));
    let store = EncryptedKeyStore::new(sealed_test_key());

    assert_eq!(signer.initialize(&store, None).await, SignerState::Ready);
    assert_eq!(signer.ready_address(), Some(TEST_ADDRESS));
}

#[tokio::test]
async fn test_tampered_ciphertext_fails_closed() {
    let mut triple = sealed_test_key();
    let flipped = if triple.ciphertext.starts_with('0') { "1" } else { "0" };
    triple.ciphertext.replace_range(0..1, flipped);

    let signer = KeySigner::new(Duration::from_secs(1));
    let state = signer.initialize(&EncryptedKeyStore::new(triple), None).await;

    assert_eq!(state, SignerState::Unavailable);
    assert!(signer.ready_address().is_none());
    assert!(matches!(signer.sign(b"x").await, Err(SignerError::Unavailable(_))));
}

#[tokio::test]
async fn test_waiting_signer_unblocks_when_key_arrives() {
    let signer = Arc::new(KeySigner::new(Duration::from_secs(5)));

    let waiter = {
        let signer = Arc::clone(&signer);
        tokio::spawn(async move { signer.sign(b"queued").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(signer.state(), SignerState::Pending);

    signer.initialize(&EncryptedKeyStore::new(sealed_test_key()), None).await;

    let signature = waiter.await.unwrap().unwrap();
    assert_eq!(ec_recover(b"queued", &signature).unwrap(), TEST_ADDRESS);
}
