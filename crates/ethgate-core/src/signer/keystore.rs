//! Sources of private key material.
//!
//! A [`KeyStore`] returns the raw 32-byte secp256k1 secret once, at signer start-up. Two
//! backends are provided:
//!
//! - [`KeyFileStore`]: a Web3 Secret Storage (v3) JSON file plus passphrase
//! - [`EncryptedKeyStore`]: an AES-256-GCM triple whose plaintext is the key itself, or a v3
//!   keystore document unlocked with a passphrase

use async_trait::async_trait;
use std::{io::Write, path::PathBuf};

use super::{
    aes::{self, EncryptedTriple},
    SignerError,
};

/// Key material provider consumed by the signer.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Returns the raw private key bytes.
    async fn load_key(&self) -> Result<Vec<u8>, SignerError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Encrypted keystore file on the local filesystem.
pub struct KeyFileStore {
    path: PathBuf,
    passphrase: String,
}

impl KeyFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self { path: path.into(), passphrase: passphrase.into() }
    }
}

#[async_trait]
impl KeyStore for KeyFileStore {
    async fn load_key(&self) -> Result<Vec<u8>, SignerError> {
        let path = self.path.clone();
        let passphrase = self.passphrase.clone();

        // Key derivation (scrypt/pbkdf2) is CPU bound.
        tokio::task::spawn_blocking(move || eth_keystore::decrypt_key(&path, passphrase))
            .await
            .map_err(|e| SignerError::KeyStore(format!("keystore task failed: {e}")))?
            .map_err(|e| SignerError::KeyStore(format!("failed to decrypt keystore file: {e}")))
    }

    fn name(&self) -> &'static str {
        "keyfile"
    }
}

/// AES-256-GCM ciphertext plus key and nonce, as kept in an external config store.
///
/// The plaintext is the private key as 32 raw bytes or as hex text, or a v3 keystore JSON
/// document decrypted with the passphrase.
pub struct EncryptedKeyStore {
    triple: EncryptedTriple,
    passphrase: Option<String>,
}

impl EncryptedKeyStore {
    #[must_use]
    pub fn new(triple: EncryptedTriple) -> Self {
        Self { triple, passphrase: None }
    }

    /// Passphrase for a keystore document inside the ciphertext.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Builds the store from the three fields, any of which may be missing.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::KeyStore`] naming the first absent field.
    pub fn from_parts(
        secret_key: Option<String>,
        nonce: Option<String>,
        ciphertext: Option<String>,
    ) -> Result<Self, SignerError> {
        let present = |name: &str, value: Option<String>| {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SignerError::KeyStore(format!("encrypted key is missing {name}")))
        };
        Ok(Self::new(EncryptedTriple {
            secret_key: present("secret_key", secret_key)?,
            nonce: present("nonce", nonce)?,
            ciphertext: present("ciphertext", ciphertext)?,
        }))
    }

    #[must_use]
    pub fn triple(&self) -> &EncryptedTriple {
        &self.triple
    }
}

#[async_trait]
impl KeyStore for EncryptedKeyStore {
    async fn load_key(&self) -> Result<Vec<u8>, SignerError> {
        let plaintext = aes::open(&self.triple)?;
        if plaintext.len() == 32 {
            return Ok(plaintext);
        }

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| SignerError::InvalidKey("decrypted key is not 32 bytes".to_string()))?;
        if text.trim_start().starts_with('{') {
            let passphrase = self.passphrase.clone().unwrap_or_default();
            return decrypt_document(plaintext, passphrase).await;
        }
        hex::decode(text.trim().trim_start_matches("0x")).map_err(|_| {
            SignerError::InvalidKey("decrypted key is neither raw nor hex".to_string())
        })
    }

    fn name(&self) -> &'static str {
        "encrypted"
    }
}

/// Decrypts an in-memory keystore document; the reader only takes paths, so it is staged in a
/// private temporary file that is removed on return.
async fn decrypt_document(document: Vec<u8>, passphrase: String) -> Result<Vec<u8>, SignerError> {
    tokio::task::spawn_blocking(move || {
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|e| SignerError::KeyStore(format!("failed to stage keystore: {e}")))?;
        file.write_all(&document)
            .map_err(|e| SignerError::KeyStore(format!("failed to stage keystore: {e}")))?;
        eth_keystore::decrypt_key(file.path(), passphrase)
            .map_err(|e| SignerError::KeyStore(format!("failed to decrypt keystore: {e}")))
    })
    .await
    .map_err(|e| SignerError::KeyStore(format!("keystore task failed: {e}")))?
}
