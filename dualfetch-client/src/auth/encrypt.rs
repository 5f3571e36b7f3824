//! Request body encryption.
//!
//! [`AesGcmEncryptor`] generates a fresh 256-bit key for every request,
//! encrypts the body with AES-256-GCM under a random 96-bit nonce and
//! returns:
//!
//! - `payload`: `base64(nonce || ciphertext)`, sent as the request body
//! - `key`: `base64(key)`, sent in the `X-Encrypted-Key` header

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::ClientError;

const NONCE_LEN: usize = 12;

/// An encrypted body and the key needed to decrypt it.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBody {
    pub payload: String,
    pub key: String,
}

impl std::fmt::Debug for EncryptedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBody")
            .field("payload_len", &self.payload.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts serialized request bodies.
pub trait BodyEncryptor: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBody, ClientError>;
}

/// AES-256-GCM with a per-request key.
#[derive(Clone, Copy, Debug, Default)]
pub struct AesGcmEncryptor;

impl AesGcmEncryptor {
    pub fn new() -> Self {
        Self
    }

    /// Reverse [`BodyEncryptor::encrypt`]. Used by receiving services and tests.
    pub fn decrypt(payload: &str, key: &str) -> Result<Vec<u8>, ClientError> {
        let key = BASE64
            .decode(key)
            .map_err(|e| ClientError::encode(format!("invalid key encoding: {e}")))?;
        let sealed = BASE64
            .decode(payload)
            .map_err(|e| ClientError::encode(format!("invalid payload encoding: {e}")))?;
        if sealed.len() < NONCE_LEN {
            return Err(ClientError::encode("encrypted payload is too short"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ClientError::encode(format!("invalid key: {e}")))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| ClientError::encode(format!("decryption failed: {e}")))
    }
}

impl BodyEncryptor for AesGcmEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBody, ClientError> {
        let key: [u8; 32] = rand::random();
        let nonce: [u8; NONCE_LEN] = rand::random();

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ClientError::encode(format!("failed to create cipher: {e}")))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| ClientError::encode(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(EncryptedBody {
            payload: BASE64.encode(sealed),
            key: BASE64.encode(key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let plaintext = br#"{"password":"hunter2"}"#;
        let encrypted = AesGcmEncryptor.encrypt(plaintext).unwrap();

        assert_ne!(encrypted.payload.as_bytes(), plaintext);
        assert!(!encrypted.key.is_empty());

        let decrypted = AesGcmEncryptor::decrypt(&encrypted.payload, &encrypted.key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_fresh_key_per_call() {
        let a = AesGcmEncryptor.encrypt(b"same").unwrap();
        let b = AesGcmEncryptor.encrypt(b"same").unwrap();
        assert_ne!(a.key, b.key);
        assert_ne!(a.payload, b.payload);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let a = AesGcmEncryptor.encrypt(b"secret").unwrap();
        let b = AesGcmEncryptor.encrypt(b"other").unwrap();
        assert!(AesGcmEncryptor::decrypt(&a.payload, &b.key).is_err());
        assert!(AesGcmEncryptor::decrypt("AAAA", &a.key).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let encrypted = AesGcmEncryptor.encrypt(b"x").unwrap();
        assert!(!format!("{encrypted:?}").contains(&encrypted.key));
    }
}
