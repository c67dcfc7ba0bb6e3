//! Known-answer vectors with the production KDF parameters.
//!
//! Salt and nonce are pinned to zero bytes so the ciphertext is
//! reproducible; real encryption always draws both at random.

use obx_core::types::Nonce;
use obx_core::ObxError;
use obx_crypto::{
    decrypt, derive_key, derive_verifier, encrypt_with_nonce, KdfParams, TAG_SIZE,
};
use pbkdf2::pbkdf2_hmac;
use secrecy::SecretString;
use sha2::Sha256;

const S1: [u8; 16] = [0u8; 16];
const N1: [u8; 12] = [0u8; 12];

/// PBKDF2-HMAC-SHA256("correct-horse", S1, 210000, 32)
const K1: &str = "91cdb6756e43c7768d59f76045c6ea2ea87c4ead4d3911f76cd44471e0501fac";
/// SHA-256(K1)
const V1: &str = "44a0687c7aedfc24de5c878f440f16489bae4b8bb84eca6df3331d51fd49ad43";
/// AES-256-GCM(K1, N1, "hello, world!"), ciphertext followed by tag
const C1: &str = "1339ba22857469475c470283438d91671d13a28fe20daf67b542e39adf";

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[test]
fn pbkdf2_sha256_rfc7914_vector() {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(b"passwd", b"salt", 1, &mut out);
    assert_eq!(
        hex(&out),
        "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
    );
}

#[test]
fn derived_key_and_verifier_are_pinned() {
    let params = KdfParams::default();
    let pw = SecretString::from("correct-horse");

    let key = derive_key(&pw, &S1, &params).unwrap();
    assert_eq!(hex(key.as_bytes()), K1);

    let verifier = derive_verifier(&pw, &S1, &params).unwrap();
    assert_eq!(hex(verifier.as_bytes()), V1);
}

#[test]
fn hello_world_fixed_salt_and_nonce() {
    let params = KdfParams::default();
    let plaintext = b"hello, world!";

    let key = derive_key(&SecretString::from("correct-horse"), &S1, &params).unwrap();
    let c1 = encrypt_with_nonce(&key, &Nonce::from_bytes(N1), plaintext).unwrap();
    assert_eq!(c1.len(), 13 + TAG_SIZE);
    assert_eq!(hex(&c1), C1);

    let decrypted = decrypt(&key, &N1, &S1, &c1).unwrap();
    assert_eq!(decrypted, plaintext);

    let wrong = derive_key(&SecretString::from("wrong"), &S1, &params).unwrap();
    let result = decrypt(&wrong, &N1, &S1, &c1);
    assert!(matches!(result, Err(ObxError::AuthenticationFailed)));
    assert_eq!(
        result.unwrap_err().to_string(),
        "wrong key or corrupted data"
    );
}
