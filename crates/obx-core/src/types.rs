use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

use crate::error::{ObxError, ObxResult};

/// Per-object KDF salt size in bytes
pub const SALT_SIZE: usize = 16;

/// AES-GCM nonce (IV) size in bytes
pub const NONCE_SIZE: usize = 12;

/// SHA-256 digest size of a key verifier
pub const VERIFIER_SIZE: usize = 32;

/// Fixed-size, non-secret byte strings persisted as base64 next to each object.
macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_base64(&self) -> String {
                STANDARD.encode(self.0)
            }

            pub fn from_base64(encoded: &str) -> ObxResult<Self> {
                let raw = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| ObxError::InvalidInput(format!("{} is not valid base64: {e}", $what)))?;
                Self::try_from(raw.as_slice())
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = ObxError;

            fn try_from(raw: &[u8]) -> ObxResult<Self> {
                let bytes: [u8; $len] = raw.try_into().map_err(|_| {
                    ObxError::InvalidInput(format!(
                        "{} must be {} bytes, got {}",
                        $what,
                        $len,
                        raw.len()
                    ))
                })?;
                Ok(Self(bytes))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_base64())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let encoded = String::deserialize(deserializer)?;
                Self::from_base64(&encoded).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 16-byte KDF salt, unique per object.
    Salt,
    SALT_SIZE,
    "salt"
);

fixed_bytes!(
    /// 12-byte AES-GCM nonce. Never reused under the same key.
    Nonce,
    NONCE_SIZE,
    "nonce"
);

/// SHA-256 of the PBKDF2 output for (passphrase, salt).
///
/// Proves knowledge of the passphrase for deletion without being usable as
/// the encryption key. Equality is checked in constant time.
#[derive(Clone, Copy)]
pub struct KeyVerifier([u8; VERIFIER_SIZE]);

impl KeyVerifier {
    pub fn from_bytes(bytes: [u8; VERIFIER_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VERIFIER_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> ObxResult<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ObxError::InvalidInput(format!("key verifier is not valid base64: {e}")))?;
        let bytes: [u8; VERIFIER_SIZE] = raw.as_slice().try_into().map_err(|_| {
            ObxError::InvalidInput(format!(
                "key verifier must be {VERIFIER_SIZE} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl PartialEq for KeyVerifier {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for KeyVerifier {}

impl std::fmt::Debug for KeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyVerifier").field(&self.to_base64()).finish()
    }
}

impl Serialize for KeyVerifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for KeyVerifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Committed metadata for one encrypted object, keyed by (owner_id, id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: String,
    pub owner_id: String,
    /// Opaque handle into the blob backend
    pub object_name: String,
    pub display_name: String,
    /// Plaintext size reported by the client at commit
    pub byte_size: u64,
    pub mime_type: String,
    pub salt: Salt,
    pub nonce: Nonce,
    /// Absent on legacy records; deletion is then unauthenticated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_verifier: Option<KeyVerifier>,
    /// Unix timestamp in milliseconds
    pub created_at: u64,
}

impl ObjectRecord {
    pub fn summary(&self) -> ObjectSummary {
        ObjectSummary {
            id: self.id.clone(),
            object_name: self.object_name.clone(),
            display_name: self.display_name.clone(),
            byte_size: self.byte_size,
            mime_type: self.mime_type.clone(),
            salt: self.salt,
            nonce: self.nonce,
            has_verifier: self.key_verifier.is_some(),
            created_at: self.created_at,
        }
    }
}

/// Client-facing view of a record. Never carries the stored verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub id: String,
    pub object_name: String,
    pub display_name: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub salt: Salt,
    pub nonce: Nonce,
    pub has_verifier: bool,
    pub created_at: u64,
}

/// Owner ids become key prefixes in both the blob and record namespaces.
pub fn validate_owner_id(owner_id: &str) -> ObxResult<()> {
    validate_key_segment("owner id", owner_id)
}

/// Record ids come from callers and are joined into record keys, so they
/// must stay a single segment with no traversal.
pub fn validate_record_id(id: &str) -> ObxResult<()> {
    validate_key_segment("record id", id)?;
    if id.contains("..") || id.contains('\\') {
        return Err(ObxError::InvalidInput(format!(
            "record id {id:?} is not a valid key segment"
        )));
    }
    Ok(())
}

fn validate_key_segment(what: &str, value: &str) -> ObxResult<()> {
    if value.is_empty() {
        return Err(ObxError::InvalidInput(format!("{what} is empty")));
    }
    if value.contains('/') || value == "." || value == ".." {
        return Err(ObxError::InvalidInput(format!(
            "{what} {value:?} is not a valid key segment"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(ObxError::InvalidInput(format!(
            "{what} contains control characters"
        )));
    }
    Ok(())
}

/// Serde adapter for raw byte fields carried as base64 on the wire.
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
