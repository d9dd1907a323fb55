//! AES-256-GCM helpers for the encrypted-key triple.
//!
//! The triple is `(secret, nonce, ciphertext)`, all hex encoded: a 32-byte key, a 12-byte
//! nonce and the sealed plaintext with its 16-byte tag appended.

use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN},
    rand::{SecureRandom, SystemRandom},
};

use super::SignerError;

/// Hex-encoded AES-256-GCM ciphertext plus the key and nonce that open it.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedTriple {
    pub secret_key: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl std::fmt::Debug for EncryptedTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedTriple")
            .field("secret_key", &"<redacted>")
            .field("nonce", &self.nonce)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, SignerError> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| SignerError::Decrypt(format!("{field} is not valid hex: {e}")))
}

fn key_from(secret: &[u8]) -> Result<LessSafeKey, SignerError> {
    UnboundKey::new(&AES_256_GCM, secret)
        .map(LessSafeKey::new)
        .map_err(|_| SignerError::Decrypt("secret key must be 32 bytes".to_string()))
}

/// Encrypts `plaintext` under `secret` with a fresh random nonce.
///
/// # Errors
///
/// Returns [`SignerError::Decrypt`] if the key is not 32 bytes or the system RNG fails.
pub fn seal(secret: &[u8], plaintext: &[u8]) -> Result<EncryptedTriple, SignerError> {
    let key = key_from(secret)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| SignerError::Decrypt("system random source failed".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| SignerError::Decrypt("encryption failed".to_string()))?;

    Ok(EncryptedTriple {
        secret_key: hex::encode(secret),
        nonce: hex::encode(nonce_bytes),
        ciphertext: hex::encode(in_out),
    })
}

/// Decrypts and authenticates the triple.
///
/// # Errors
///
/// Returns [`SignerError::Decrypt`] for malformed hex, wrong lengths or a failed tag check.
pub fn open(triple: &EncryptedTriple) -> Result<Vec<u8>, SignerError> {
    let secret = decode_hex("secret key", &triple.secret_key)?;
    let nonce = decode_hex("nonce", &triple.nonce)?;
    let mut in_out = decode_hex("ciphertext", &triple.ciphertext)?;

    let key = key_from(&secret)?;
    let nonce = Nonce::try_assume_unique_for_key(&nonce)
        .map_err(|_| SignerError::Decrypt(format!("nonce must be {NONCE_LEN} bytes")))?;

    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| SignerError::Decrypt("authentication failed".to_string()))?;
    Ok(plaintext.to_vec())
}
