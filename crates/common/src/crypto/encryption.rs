//! Passphrase-keyed AES-256-CTR encryption for persisted session state.
//!
//! Every call to [`EncryptionService::encrypt`] draws a fresh 16-byte IV and
//! prepends it to the ciphertext, so the output layout is
//! `IV (16 bytes) || ciphertext`. CTR mode carries no authentication tag: a
//! wrong passphrase decrypts to garbage rather than failing here, and callers
//! are expected to validate the plaintext (the session cache does so by
//! parsing it as JSON).
//!
//! ## Usage
//!
//! ```rust
//! use twinline_common::crypto::encryption::EncryptionService;
//!
//! let service = EncryptionService::from_passphrase("correct horse");
//! let encrypted = service.encrypt(b"session headers");
//! let decrypted = service.decrypt(&encrypted)?;
//! assert_eq!(decrypted, b"session headers");
//! # Ok::<(), twinline_common::error::CommonError>(())
//! ```

use aes::cipher::{KeyIvInit, StreamCipher};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{CommonError, CommonResult};

/// Length of the random IV prepended to every ciphertext.
pub const IV_LEN: usize = 16;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// AES-256-CTR encryption keyed from a passphrase.
pub struct EncryptionService {
    key: [u8; 32],
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").field("key", &"[REDACTED]").finish()
    }
}

impl EncryptionService {
    /// Create a service from a raw 32-byte key.
    pub fn new(key: &[u8]) -> CommonResult<Self> {
        let key: [u8; 32] = key
            .try_into()
            .map_err(|_| CommonError::crypto("Encryption key must be exactly 32 bytes"))?;
        Ok(Self { key })
    }

    /// Derive the key as the SHA-256 digest of `passphrase`.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt `data`, returning `IV || ciphertext`.
    pub fn encrypt(&self, data: &[u8]) -> Vec<u8> {
        let iv = Self::generate_iv();
        let mut out = Vec::with_capacity(IV_LEN + data.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(data);

        let mut cipher = Aes256Ctr::new(&self.key.into(), &iv.into());
        cipher.apply_keystream(&mut out[IV_LEN..]);
        out
    }

    /// Decrypt an `IV || ciphertext` payload.
    ///
    /// Fails only when the payload is shorter than one IV block.
    pub fn decrypt(&self, payload: &[u8]) -> CommonResult<Vec<u8>> {
        if payload.len() < IV_LEN {
            return Err(CommonError::crypto(format!(
                "Ciphertext too short: {} bytes, need at least {IV_LEN}",
                payload.len()
            )));
        }

        let (iv, ciphertext) = payload.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| CommonError::internal("IV slice has unexpected length"))?;

        let mut plaintext = ciphertext.to_vec();
        let mut cipher = Aes256Ctr::new(&self.key.into(), &iv.into());
        cipher.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }

    /// Encrypt bytes and encode the payload as a base64 string.
    pub fn encrypt_to_string(&self, data: &[u8]) -> String {
        BASE64.encode(self.encrypt(data))
    }

    /// Decode a base64 string and decrypt the contained payload.
    pub fn decrypt_from_string(&self, encoded: &str) -> CommonResult<Vec<u8>> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| CommonError::encoding("base64", e.to_string()))?;
        self.decrypt(&decoded)
    }

    fn generate_iv() -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        iv
    }
}
