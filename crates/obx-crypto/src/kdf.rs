//! Key derivation: PBKDF2-HMAC-SHA256 passphrase → AES-256 key + key verifier

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use obx_core::types::{KeyVerifier, Salt, SALT_SIZE};
use obx_core::{ObxError, ObxResult};

use crate::{DEFAULT_ITERATIONS, KEY_SIZE};

/// A 256-bit AES key derived from a passphrase and a per-object salt.
///
/// Never persisted. Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// SHA-256 over the derived bits. The stored verifier is therefore one
    /// hash away from the key and cannot be used to decrypt.
    pub fn verifier(&self) -> KeyVerifier {
        let digest = Sha256::digest(self.bytes);
        KeyVerifier::from_bytes(digest.into())
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// HMAC-SHA256 iterations (default: 210000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl From<&obx_core::config::CryptoConfig> for KdfParams {
    fn from(cfg: &obx_core::config::CryptoConfig) -> Self {
        Self {
            iterations: cfg.pbkdf2_iterations,
        }
    }
}

/// Generate a fresh random salt for a new object.
pub fn generate_salt() -> Salt {
    let mut bytes = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    Salt::from_bytes(bytes)
}

/// Derive the 256-bit encryption key for (passphrase, salt).
///
/// Pure: identical inputs always yield the identical key, which is how the
/// key is re-derived on every decrypt instead of being cached anywhere.
/// Any passphrase is accepted, including the empty one; only the salt
/// length and iteration count are checked.
pub fn derive_key(
    passphrase: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> ObxResult<EncryptionKey> {
    if salt.len() != SALT_SIZE {
        return Err(ObxError::InvalidInput(format!(
            "salt must be {SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }
    if params.iterations == 0 {
        return Err(ObxError::invalid_input("PBKDF2 iteration count must be non-zero"));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        passphrase.expose_secret().as_bytes(),
        salt,
        params.iterations,
        &mut key,
    );
    Ok(EncryptionKey::from_bytes(key))
}

/// Derive the non-secret key verifier for (passphrase, salt).
pub fn derive_verifier(
    passphrase: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> ObxResult<KeyVerifier> {
    Ok(derive_key(passphrase, salt, params)?.verifier())
}
