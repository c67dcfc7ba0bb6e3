//! obx-crypto: client-side encryption for opaquebox
//!
//! Nothing in this crate ever leaves the client: the key is derived, used and
//! zeroized in process memory. Only ciphertext, salt, nonce and the key
//! verifier are handed to the server side.
//!
//! ```text
//! passphrase ─┬─ PBKDF2-HMAC-SHA256(salt, 210k) ─► key (256-bit) ─► AES-256-GCM(nonce)
//!             │                                      │
//!             │                                      └─ SHA-256 ─► key verifier (stored)
//! salt (16 B, per object)          nonce (12 B, per encryption)
//! ```

pub mod cipher;
pub mod envelope;
pub mod kdf;

pub use cipher::{decrypt, encrypt, encrypt_with_nonce, generate_nonce, Sealed};
pub use envelope::{open, seal, SealedObject};
pub use kdf::{derive_key, derive_verifier, generate_salt, EncryptionKey, KdfParams};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// PBKDF2 iteration count used unless configured otherwise
pub const DEFAULT_ITERATIONS: u32 = 210_000;
