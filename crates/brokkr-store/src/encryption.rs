//! At-rest encryption for stored record values.
//!
//! AES-256-GCM with a single configured key. Ciphertext, IV and
//! authentication tag are carried as three separate base64 fields so a
//! reader can tell an encrypted record from a plaintext one without trial
//! decryption.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{StoreError, StoreResult};

/// Length of the AES-256 key in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of the GCM initialization vector in bytes.
const IV_LENGTH: usize = 12;

/// Length of the GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Output of one encryption: ciphertext plus envelope, all base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub value: String,
    pub iv: String,
    pub tag: String,
}

/// Encrypts and decrypts record values with a configured key.
#[derive(Clone)]
pub struct Encrypter {
    key: [u8; KEY_LENGTH],
}

impl Encrypter {
    /// Create an encrypter from a raw 32-byte key.
    #[must_use]
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create an encrypter from a 64-character hex-encoded key.
    pub fn from_hex(hex_key: &str) -> StoreResult<Self> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| StoreError::Encryption(format!("invalid hex key: {e}")))?;

        if bytes.len() != KEY_LENGTH {
            return Err(StoreError::Encryption(format!(
                "key must be {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }

    /// Encrypt a plaintext value.
    ///
    /// A fresh random IV is drawn from the OS CSPRNG for every write; the
    /// 16-byte GCM tag is split off the ciphertext and returned separately.
    pub fn encrypt(&self, plaintext: &[u8]) -> StoreResult<EncryptedEnvelope> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| StoreError::Encryption(format!("failed to create cipher: {e}")))?;

        use rand::rngs::OsRng;
        use rand::RngCore;
        let mut iv_bytes = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv_bytes);
        let nonce = Nonce::from_slice(&iv_bytes);

        let mut ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| StoreError::Encryption(format!("encryption failed: {e}")))?;

        // AES-GCM appends the tag; carry it as its own field.
        let tag = ciphertext.split_off(ciphertext.len() - TAG_LENGTH);

        Ok(EncryptedEnvelope {
            value: STANDARD.encode(&ciphertext),
            iv: STANDARD.encode(iv_bytes),
            tag: STANDARD.encode(&tag),
        })
    }

    /// Decrypt a record's envelope back to the plaintext value.
    ///
    /// Fails on bad base64, a wrong-length IV or tag, or a value/iv/tag
    /// triple that does not authenticate.
    pub fn decrypt(&self, value: &str, iv: &str, tag: &str) -> StoreResult<Vec<u8>> {
        let ciphertext = STANDARD
            .decode(value)
            .map_err(|e| StoreError::Decryption(format!("invalid base64 value: {e}")))?;
        let iv_bytes = STANDARD
            .decode(iv)
            .map_err(|e| StoreError::Decryption(format!("invalid base64 iv: {e}")))?;
        let tag_bytes = STANDARD
            .decode(tag)
            .map_err(|e| StoreError::Decryption(format!("invalid base64 tag: {e}")))?;

        if iv_bytes.len() != IV_LENGTH {
            return Err(StoreError::Decryption(format!(
                "iv must be {IV_LENGTH} bytes, got {}",
                iv_bytes.len()
            )));
        }
        if tag_bytes.len() != TAG_LENGTH {
            return Err(StoreError::Decryption(format!(
                "tag must be {TAG_LENGTH} bytes, got {}",
                tag_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| StoreError::Decryption(format!("failed to create cipher: {e}")))?;

        let nonce = Nonce::from_slice(&iv_bytes);
        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LENGTH);
        sealed.extend_from_slice(&ciphertext);
        sealed.extend_from_slice(&tag_bytes);

        cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| StoreError::Decryption("value did not authenticate".to_string()))
    }
}

impl std::fmt::Debug for Encrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encrypter")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 32-byte key.
///
/// SECURITY: Uses `OsRng` directly from the operating system's CSPRNG.
#[must_use]
pub fn generate_key() -> [u8; KEY_LENGTH] {
    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut key = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random key as a hex string, for initial setup.
#[must_use]
pub fn generate_key_hex() -> String {
    hex::encode(generate_key())
}
