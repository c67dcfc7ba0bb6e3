//! Client-side envelope: passphrase + plaintext → everything an object needs
//! to be uploaded and committed, and the reverse.

use secrecy::SecretString;

use obx_core::types::{KeyVerifier, Nonce, Salt};
use obx_core::ObxResult;

use crate::cipher::{self, validate_ciphertext};
use crate::kdf::{derive_key, generate_salt, KdfParams};

/// A freshly encrypted object plus the non-secret metadata to commit with it.
#[derive(Debug, Clone)]
pub struct SealedObject {
    pub ciphertext: Vec<u8>,
    pub salt: Salt,
    pub nonce: Nonce,
    pub verifier: KeyVerifier,
}

/// Encrypt `plaintext` under a key derived from `passphrase` and a new salt.
pub fn seal(
    passphrase: &SecretString,
    plaintext: &[u8],
    params: &KdfParams,
) -> ObxResult<SealedObject> {
    let salt = generate_salt();
    let key = derive_key(passphrase, salt.as_bytes(), params)?;
    let sealed = cipher::encrypt(&key, plaintext)?;

    Ok(SealedObject {
        ciphertext: sealed.ciphertext,
        salt,
        nonce: sealed.nonce,
        verifier: key.verifier(),
    })
}

/// Re-derive the key from the stored salt and decrypt.
///
/// Shape checks run before the (slow) key derivation.
pub fn open(
    passphrase: &SecretString,
    salt: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    params: &KdfParams,
) -> ObxResult<Vec<u8>> {
    Nonce::try_from(nonce)?;
    Salt::try_from(salt)?;
    validate_ciphertext(ciphertext)?;

    let key = derive_key(passphrase, salt, params)?;
    cipher::decrypt(&key, nonce, salt, ciphertext)
}
