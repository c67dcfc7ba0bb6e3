//! Transfer payloads as they arrive over text-only wires.
//!
//! Accepted shapes, all normalised to [`Bytes`] on ingress:
//!   - `"aGVsbG8="`                       base64 string (canonical)
//!   - `[104, 101, 108, 108, 111]`        JSON byte array
//!   - `{"type": "Buffer", "data": [..]}` serialized Node buffer
//!
//! Serialization always emits the canonical base64 string.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use obx_core::{ObxError, ObxResult};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WirePayload(Bytes);

impl WirePayload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Parse a JSON document holding one payload in any accepted shape.
    pub fn from_json(json: &str) -> ObxResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ObxError::InvalidInput(format!("unrecognised payload: {e}")))
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for WirePayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<WirePayload> for Bytes {
    fn from(payload: WirePayload) -> Self {
        payload.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Shape {
    Text(String),
    Array(Vec<u8>),
    Buffer {
        #[serde(rename = "type")]
        kind: String,
        data: Vec<u8>,
    },
}

impl<'de> Deserialize<'de> for WirePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Shape::deserialize(deserializer)? {
            Shape::Text(encoded) => STANDARD
                .decode(encoded.trim())
                .map(WirePayload::from)
                .map_err(|e| serde::de::Error::custom(format!("payload is not base64: {e}"))),
            Shape::Array(bytes) => Ok(WirePayload::from(bytes)),
            Shape::Buffer { kind, data } if kind == "Buffer" => Ok(WirePayload::from(data)),
            Shape::Buffer { kind, .. } => Err(serde::de::Error::custom(format!(
                "unsupported payload object type {kind:?}"
            ))),
        }
    }
}

impl Serialize for WirePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}
