//! Operator key signer and nonce coordinator.
//!
//! # Start-up Gate
//!
//! ```text
//!   KeySigner::new ──► Pending ──initialize(store)──► Ready(credential)
//!                         │                     └───► Unavailable(reason)
//!                         │
//!            callers wait here until the state leaves Pending or the
//!            start-up deadline passes, then fail closed
//! ```
//!
//! The state lives in a `watch` channel and only ever leaves `Pending` once. Plain passthrough
//! traffic never touches the signer, so a missing key only affects signing paths.
//!
//! # Nonce Section
//!
//! [`KeySigner::apply_nonce`] holds one lock across read-nonce, the caller's whole
//! build-sign-broadcast operation, and the conditional increment. The stored nonce advances
//! only when the operation succeeds, so the nonces handed out form a gapless sequence. A slow
//! broadcast delays every signed submission queued behind it.

pub mod aes;
pub mod keystore;
pub mod tx;

use alloy_primitives::{keccak256, Address, B256, U256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use std::{
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    time::Instant,
};
use tracing::{info, warn};

use crate::{
    metrics::MetricsCollector,
    types::Network,
    upstream::{CallContext, NodePool, UpstreamError},
};

pub use aes::EncryptedTriple;
pub use keystore::{EncryptedKeyStore, KeyFileStore, KeyStore};
pub use tx::{LegacyTransaction, SignedTransaction};

/// Length of an Ethereum `r || s || v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Debug, Error)]
pub enum SignerError {
    /// No credential is established (not configured, failed to load, or not ready in time).
    #[error("signer unavailable: {0}")]
    Unavailable(String),

    /// The key store could not produce key material.
    #[error("key store error: {0}")]
    KeyStore(String),

    /// AES-GCM decryption of the key triple failed.
    #[error("key decryption failed: {0}")]
    Decrypt(String),

    /// Key bytes are not a valid secp256k1 secret.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    /// Signature is malformed or the public key cannot be recovered from it.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The starting nonce has not been learned from the node yet.
    #[error("nonce not synchronized")]
    NonceUnsynchronized,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl SignerError {
    /// Returns `true` for errors about missing or unusable key material.
    #[must_use]
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::KeyStore(_) | Self::Decrypt(_) | Self::InvalidKey(_)
        )
    }
}

/// Loaded key material plus the lazily learned chain id and nonce.
pub struct Credential {
    signing_key: SigningKey,
    address: Address,
    chain_id: OnceLock<u64>,
    nonce: Mutex<Option<u64>>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id.get())
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if `secret` is not a valid secp256k1 scalar.
    pub fn from_secret(secret: &[u8]) -> Result<Self, SignerError> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = address_of(signing_key.verifying_key());
        Ok(Self { signing_key, address, chain_id: OnceLock::new(), nonce: Mutex::new(None) })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id.get().copied()
    }

    fn sign_prehash(&self, hash: &B256) -> Result<(Signature, RecoveryId), SignerError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| SignerError::Signing(e.to_string()))?;

        // Ethereum only accepts low-S signatures; flipping S flips the recovered point's parity.
        match signature.normalize_s() {
            Some(normalized) => {
                let flipped = RecoveryId::from_byte(recovery_id.to_byte() ^ 1)
                    .ok_or_else(|| SignerError::Signing("bad recovery id".to_string()))?;
                Ok((normalized, flipped))
            }
            None => Ok((signature, recovery_id)),
        }
    }
}

/// Public state of the start-up gate, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerState {
    Pending,
    Ready,
    Unavailable,
}

impl SignerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Clone)]
enum InitState {
    Pending,
    Ready(Arc<Credential>),
    Unavailable(String),
}

/// Operator key signer shared by every request handler.
pub struct KeySigner {
    state: watch::Sender<InitState>,
    deadline: Instant,
    metrics: Option<Arc<MetricsCollector>>,
}

impl KeySigner {
    /// A signer waiting for [`Self::initialize`]; callers give up `init_timeout` from now.
    #[must_use]
    pub fn new(init_timeout: Duration) -> Self {
        let (state, _) = watch::channel(InitState::Pending);
        Self { state, deadline: Instant::now() + init_timeout, metrics: None }
    }

    /// A signer with no key source; every signing call fails with a credential error.
    #[must_use]
    pub fn disabled() -> Self {
        let signer = Self::new(Duration::ZERO);
        signer.finish(InitState::Unavailable("no key source configured".to_string()));
        signer
    }

    /// A signer that is ready immediately with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] for a bad secret.
    pub fn from_secret(secret: &[u8]) -> Result<Self, SignerError> {
        let signer = Self::new(Duration::ZERO);
        let credential = Credential::from_secret(secret)?;
        signer.finish(InitState::Ready(Arc::new(credential)));
        Ok(signer)
    }

    /// Attaches `metrics`; a signer that already left `Pending` reports its outcome now.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        if let Some(ready) = self.settled() {
            metrics.record_signer_ready(ready);
        }
        self.metrics = Some(metrics);
        self
    }

    /// `Some(ready)` once initialization has finished either way.
    fn settled(&self) -> Option<bool> {
        match &*self.state.borrow() {
            InitState::Pending => None,
            InitState::Ready(_) => Some(true),
            InitState::Unavailable(_) => Some(false),
        }
    }

    /// Leaves `Pending` exactly once; later transitions are ignored.
    fn finish(&self, next: InitState) -> bool {
        let ready = matches!(next, InitState::Ready(_));
        let changed = self.state.send_if_modified(|state| {
            if matches!(state, InitState::Pending) {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            if let Some(metrics) = &self.metrics {
                metrics.record_signer_ready(ready);
            }
        }
        changed
    }

    /// Loads the key from `store` and opens the gate.
    ///
    /// Failures leave the signer unavailable instead of propagating, so start-up continues
    /// and passthrough keeps working.
    pub async fn initialize(&self, store: &dyn KeyStore, chain_id: Option<u64>) -> SignerState {
        let loaded = store.load_key().await.and_then(|secret| Credential::from_secret(&secret));
        match loaded {
            Ok(credential) => {
                if let Some(chain_id) = chain_id {
                    let _ = credential.chain_id.set(chain_id);
                }
                info!(
                    address = %credential.address,
                    source = store.name(),
                    "signer credential loaded"
                );
                self.finish(InitState::Ready(Arc::new(credential)));
            }
            Err(e) => {
                warn!(source = store.name(), error = %e, "signer credential unavailable");
                self.finish(InitState::Unavailable(e.to_string()));
            }
        }
        self.state()
    }

    #[must_use]
    pub fn state(&self) -> SignerState {
        match &*self.state.borrow() {
            InitState::Pending if Instant::now() >= self.deadline => SignerState::Unavailable,
            InitState::Pending => SignerState::Pending,
            InitState::Ready(_) => SignerState::Ready,
            InitState::Unavailable(_) => SignerState::Unavailable,
        }
    }

    /// Waits for the gate, up to the start-up deadline.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Unavailable`] if loading failed or did not finish in time.
    pub async fn credential(&self) -> Result<Arc<Credential>, SignerError> {
        let mut receiver = self.state.subscribe();
        let waited = tokio::time::timeout_at(
            self.deadline,
            receiver.wait_for(|state| !matches!(state, InitState::Pending)),
        )
        .await;

        match waited {
            Ok(Ok(state)) => match &*state {
                InitState::Ready(credential) => Ok(Arc::clone(credential)),
                InitState::Unavailable(reason) => Err(SignerError::Unavailable(reason.clone())),
                InitState::Pending => Err(SignerError::Unavailable("still initializing".into())),
            },
            Ok(Err(_)) => Err(SignerError::Unavailable("initialization abandoned".to_string())),
            Err(_) => Err(SignerError::Unavailable(
                "credential not loaded before start-up deadline".to_string(),
            )),
        }
    }

    /// Operator address if the credential is already loaded; never waits.
    #[must_use]
    pub fn ready_address(&self) -> Option<Address> {
        match &*self.state.borrow() {
            InitState::Ready(credential) => Some(credential.address),
            _ => None,
        }
    }

    /// # Errors
    ///
    /// See [`Self::credential`].
    pub async fn address(&self) -> Result<Address, SignerError> {
        Ok(self.credential().await?.address)
    }

    /// Signs `message` with the personal-message prefix; returns `r || s || v` with `v` in
    /// `{27, 28}`.
    ///
    /// # Errors
    ///
    /// Credential errors, or [`SignerError::Signing`].
    pub async fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH], SignerError> {
        let credential = self.credential().await?;
        let (signature, recovery_id) = credential.sign_prehash(&personal_message_hash(message))?;

        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(out)
    }

    /// Signs `tx`, with EIP-155 replay protection when the chain id is known.
    ///
    /// # Errors
    ///
    /// Credential errors, or [`SignerError::Signing`].
    pub async fn sign_tx(&self, tx: LegacyTransaction) -> Result<SignedTransaction, SignerError> {
        let credential = self.credential().await?;
        let chain_id = credential.chain_id();
        let (signature, recovery_id) = credential.sign_prehash(&tx.signing_hash(chain_id))?;

        let bytes = signature.to_bytes();
        let r = U256::from_be_slice(&bytes[..32]);
        let s = U256::from_be_slice(&bytes[32..]);
        Ok(tx.into_signed(recovery_id.to_byte(), r, s, chain_id))
    }

    /// Records the chain id unless one is already known.
    ///
    /// # Errors
    ///
    /// Credential errors.
    pub async fn init_chain_id(&self, chain_id: u64) -> Result<(), SignerError> {
        let _ = self.credential().await?.chain_id.set(chain_id);
        Ok(())
    }

    /// Records the starting nonce unless one is already known.
    ///
    /// # Errors
    ///
    /// Credential errors.
    pub async fn init_nonce(&self, nonce: u64) -> Result<(), SignerError> {
        let credential = self.credential().await?;
        let mut guard = credential.nonce.lock().await;
        guard.get_or_insert(nonce);
        Ok(())
    }

    /// The nonce the next successful [`Self::apply_nonce`] will use.
    ///
    /// # Errors
    ///
    /// Credential errors.
    pub async fn current_nonce(&self) -> Result<Option<u64>, SignerError> {
        Ok(*self.credential().await?.nonce.lock().await)
    }

    /// Learns the starting nonce through `fetch` if it is not known yet.
    ///
    /// `fetch` runs under the nonce lock, so concurrent first submissions query once.
    ///
    /// # Errors
    ///
    /// Credential errors, or whatever `fetch` returns.
    pub async fn seed_nonce<F, Fut, E>(&self, fetch: F) -> Result<u64, E>
    where
        F: FnOnce(Address) -> Fut,
        Fut: Future<Output = Result<u64, E>>,
        E: From<SignerError>,
    {
        let credential = self.credential().await?;
        let mut guard = credential.nonce.lock().await;
        if let Some(nonce) = *guard {
            return Ok(nonce);
        }
        let nonce = fetch(credential.address).await?;
        *guard = Some(nonce);
        info!(address = %credential.address, nonce, "transaction nonce synchronized");
        Ok(nonce)
    }

    /// Runs `operation` with the next nonce and advances it only if the operation succeeds.
    ///
    /// The lock is held until `operation` completes, so at most one nonce is in flight.
    ///
    /// # Errors
    ///
    /// Credential errors, [`SignerError::NonceUnsynchronized`] before the nonce is learned,
    /// or the error returned by `operation` (the nonce is left unchanged).
    pub async fn apply_nonce<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SignerError>,
    {
        let credential = self.credential().await?;
        let mut guard = credential.nonce.lock().await;
        let nonce = guard.ok_or(SignerError::NonceUnsynchronized)?;

        let result = operation(nonce).await;
        let committed = result.is_ok();
        if committed {
            *guard = Some(nonce + 1);
        }
        drop(guard);

        tracing::debug!(nonce, committed, "nonce section finished");
        if let Some(metrics) = &self.metrics {
            metrics.record_nonce(committed);
        }
        result
    }

    /// Learns the chain id and starting nonce from `network`, best effort.
    ///
    /// Values that cannot be fetched now are learned before the first signed submission.
    pub async fn synchronize(&self, pool: &NodePool, network: Network, ctx: &CallContext) {
        let Ok(credential) = self.credential().await else {
            return;
        };

        if credential.chain_id().is_none() {
            match pool.chain_id(network, ctx).await {
                Ok(chain_id) => {
                    let _ = credential.chain_id.set(chain_id);
                    info!(network = %network, chain_id, "chain id learned");
                }
                Err(e) => warn!(network = %network, error = %e, "chain id not learned at start-up"),
            }
        }

        let seeded = self
            .seed_nonce(|address| async move {
                pool.transaction_count(network, address, ctx).await.map_err(SignerError::from)
            })
            .await;
        if let Err(e) = seeded {
            warn!(network = %network, error = %e, "nonce not learned at start-up");
        }
    }
}

/// `keccak256("\x19Ethereum Signed Message:\n" ++ len(message) ++ message)`.
#[must_use]
pub fn personal_message_hash(message: &[u8]) -> B256 {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut data = Vec::with_capacity(prefix.len() + message.len());
    data.extend_from_slice(prefix.as_bytes());
    data.extend_from_slice(message);
    keccak256(&data)
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recovers the signer of a 32-byte prehash from an `r || s || v` signature.
///
/// `v` may be `0`/`1` or `27`/`28`.
///
/// # Errors
///
/// Returns [`SignerError::InvalidSignature`] for a wrong length, an out-of-range `v`, or a
/// signature that does not recover.
pub fn recover_prehash(hash: &B256, signature: &[u8]) -> Result<Address, SignerError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(SignerError::InvalidSignature(format!(
            "signature must be {SIGNATURE_LENGTH} bytes long"
        )));
    }
    let v = match signature[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        _ => {
            return Err(SignerError::InvalidSignature(
                "invalid Ethereum signature (V is not 27 or 28)".to_string(),
            ))
        }
    };

    let parsed = Signature::from_slice(&signature[..64])
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| SignerError::InvalidSignature("bad recovery id".to_string()))?;
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &parsed, recovery_id)
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&key))
}

/// Recovers the signer of a personal message, the inverse of [`KeySigner::sign`].
///
/// # Errors
///
/// See [`recover_prehash`].
pub fn ec_recover(message: &[u8], signature: &[u8]) -> Result<Address, SignerError> {
    recover_prehash(&personal_message_hash(message), signature)
}
