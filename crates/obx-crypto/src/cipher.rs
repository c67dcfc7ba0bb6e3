//! Whole-object AES-256-GCM encryption/decryption
//!
//! Ciphertext layout: `[N bytes: ciphertext][16 bytes: GCM tag]`. The nonce
//! and salt are not embedded; they are persisted in the object's record.

use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit},
    Aes256Gcm,
};
use rand::RngCore;

use obx_core::types::{Nonce, Salt, NONCE_SIZE};
use obx_core::{ObxError, ObxResult};

use crate::kdf::EncryptionKey;
use crate::TAG_SIZE;

type GcmNonce = aes_gcm::Nonce<U12>;

/// Output of [`encrypt`]: the caller persists `nonce` with the object's salt.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce,
}

/// Generate a fresh random 96-bit nonce.
pub fn generate_nonce() -> Nonce {
    let mut bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    Nonce::from_bytes(bytes)
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> ObxResult<Sealed> {
    let nonce = generate_nonce();
    let ciphertext = encrypt_with_nonce(key, &nonce, plaintext)?;
    Ok(Sealed { ciphertext, nonce })
}

/// Encrypt with a caller-chosen nonce.
///
/// Reusing a nonce under the same key breaks GCM. Only for known-answer
/// checks; everything else goes through [`encrypt`].
pub fn encrypt_with_nonce(
    key: &EncryptionKey,
    nonce: &Nonce,
    plaintext: &[u8],
) -> ObxResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .encrypt(GcmNonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|_| ObxError::invalid_input("plaintext too large for AES-GCM"))
}

/// Decrypt and authenticate `ciphertext`.
///
/// Input shape is checked first and reported as `InvalidInput`. Any failure
/// of the cipher itself is `AuthenticationFailed`, with no hint whether the
/// key was wrong or the bytes were altered. No partial plaintext escapes.
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &[u8],
    salt: &[u8],
    ciphertext: &[u8],
) -> ObxResult<Vec<u8>> {
    let nonce = Nonce::try_from(nonce)?;
    Salt::try_from(salt)?;
    validate_ciphertext(ciphertext)?;

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(GcmNonce::from_slice(nonce.as_bytes()), ciphertext)
        .map_err(|_| {
            tracing::debug!(len = ciphertext.len(), "AEAD open failed");
            ObxError::AuthenticationFailed
        })
}

/// Empty or sub-tag-length buffers can never be valid GCM output.
pub(crate) fn validate_ciphertext(ciphertext: &[u8]) -> ObxResult<()> {
    if ciphertext.is_empty() {
        return Err(ObxError::invalid_input("no data to decrypt"));
    }
    if ciphertext.len() < TAG_SIZE {
        return Err(ObxError::InvalidInput(format!(
            "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
            ciphertext.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;
    use proptest::prelude::*;

    fn key(byte: u8) -> EncryptionKey {
        EncryptionKey::from_bytes([byte; KEY_SIZE])
    }

    const SALT: [u8; 16] = [0u8; 16];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let k = key(1);
        let plaintext = b"hello, encrypted world!";

        let sealed = encrypt(&k, plaintext).unwrap();
        let decrypted = decrypt(&k, sealed.nonce.as_bytes(), &SALT, &sealed.ciphertext).unwrap();

        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty_plaintext() {
        let k = key(1);
        let sealed = encrypt(&k, b"").unwrap();
        assert_eq!(sealed.ciphertext.len(), TAG_SIZE);

        let decrypted = decrypt(&k, sealed.nonce.as_bytes(), &SALT, &sealed.ciphertext).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_encrypted_size() {
        let sealed = encrypt(&key(1), &[0u8; 1000]).unwrap();
        // plaintext (1000) + tag (16)
        assert_eq!(sealed.ciphertext.len(), 1000 + TAG_SIZE);
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let k = key(1);
        let a = encrypt(&k, b"same").unwrap();
        let b = encrypt(&k, b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_fixed_nonce_is_deterministic() {
        let k = key(1);
        let nonce = Nonce::from_bytes([0u8; NONCE_SIZE]);
        let c1 = encrypt_with_nonce(&k, &nonce, b"hello, world!").unwrap();
        let c2 = encrypt_with_nonce(&k, &nonce, b"hello, world!").unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let sealed = encrypt(&key(1), b"secret data").unwrap();
        let result = decrypt(&key(2), sealed.nonce.as_bytes(), &SALT, &sealed.ciphertext);
        assert!(matches!(result, Err(ObxError::AuthenticationFailed)));
    }

    #[test]
    fn test_decrypt_wrong_nonce() {
        let k = key(1);
        let sealed = encrypt(&k, b"secret data").unwrap();
        let result = decrypt(&k, &[9u8; NONCE_SIZE], &SALT, &sealed.ciphertext);
        assert!(matches!(result, Err(ObxError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let k = key(1);
        let mut sealed = encrypt(&k, b"secret data").unwrap();
        sealed.ciphertext[0] ^= 0xFF;

        let result = decrypt(&k, sealed.nonce.as_bytes(), &SALT, &sealed.ciphertext);
        assert!(matches!(result, Err(ObxError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_tag() {
        let k = key(1);
        let mut sealed = encrypt(&k, b"secret data").unwrap();
        let last = sealed.ciphertext.len() - 1;
        sealed.ciphertext[last] ^= 0x01;

        let result = decrypt(&k, sealed.nonce.as_bytes(), &SALT, &sealed.ciphertext);
        assert!(matches!(result, Err(ObxError::AuthenticationFailed)));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let k = key(1);
        let sealed = encrypt(&k, b"secret data that is long enough").unwrap();
        let truncated = &sealed.ciphertext[..sealed.ciphertext.len() - 4];

        let result = decrypt(&k, sealed.nonce.as_bytes(), &SALT, truncated);
        assert!(matches!(result, Err(ObxError::AuthenticationFailed)));
    }

    #[test]
    fn test_input_validation_precedes_decryption() {
        let k = key(1);
        let sealed = encrypt(&k, b"x").unwrap();
        let nonce = sealed.nonce.as_bytes();

        let bad_nonce = decrypt(&k, &[0u8; 11], &SALT, &sealed.ciphertext);
        assert!(matches!(bad_nonce, Err(ObxError::InvalidInput(_))));

        let bad_salt = decrypt(&k, nonce, &[0u8; 12], &sealed.ciphertext);
        assert!(matches!(bad_salt, Err(ObxError::InvalidInput(_))));

        let empty = decrypt(&k, nonce, &SALT, &[]);
        assert!(matches!(empty, Err(ObxError::InvalidInput(_))));

        let short = decrypt(&k, nonce, &SALT, &[0u8; TAG_SIZE - 1]);
        assert!(matches!(short, Err(ObxError::InvalidInput(_))));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..4096), k in any::<u8>()) {
            let k = key(k);
            let sealed = encrypt(&k, &plaintext).unwrap();
            let decrypted = decrypt(&k, sealed.nonce.as_bytes(), &SALT, &sealed.ciphertext).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }

        #[test]
        fn prop_wrong_key_fails(
            plaintext in proptest::collection::vec(any::<u8>(), 0..1024),
            a in any::<u8>(),
            b in any::<u8>(),
        ) {
            prop_assume!(a != b);
            let sealed = encrypt(&key(a), &plaintext).unwrap();
            let result = decrypt(&key(b), sealed.nonce.as_bytes(), &SALT, &sealed.ciphertext);
            prop_assert!(matches!(result, Err(ObxError::AuthenticationFailed)));
        }
    }
}
