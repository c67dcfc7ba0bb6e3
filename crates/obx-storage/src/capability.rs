//! Capability URLs: short-lived, single-object, single-permission grants.
//!
//! The server side hands these out so that ciphertext travels directly
//! between the client and the blob store, never through ambient credentials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use obx_core::{ObxError, ObxResult};

/// What a capability URL allows. Exactly one per URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Create/overwrite the object (upload)
    Write,
    /// Read the object (download)
    Read,
}

/// A time-bounded URL scoped to one object and one permission.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub url: String,
    pub object_name: String,
    pub permission: Permission,
    /// Unix timestamp in milliseconds after which the URL stops working
    pub expires_at: u64,
    /// Extra headers the signer requires on the request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl Capability {
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at
    }
}

// The query string is the signature; keep it out of logs.
impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let base = self.url.split('?').next().unwrap_or_default();
        f.debug_struct("Capability")
            .field("url", &format_args!("{base}?[REDACTED]"))
            .field("object_name", &self.object_name)
            .field("permission", &self.permission)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Issues capability URLs for objects in the blob backend.
#[async_trait]
pub trait CapabilityIssuer: Send + Sync {
    /// Write-only URL for `object_name`. Provisions the backing container
    /// first if it does not exist yet.
    async fn issue_write_capability(&self, object_name: &str, ttl: Duration)
        -> ObxResult<Capability>;

    /// Read-only URL for `object_name`.
    async fn issue_read_capability(&self, object_name: &str, ttl: Duration)
        -> ObxResult<Capability>;
}

/// The full blob-backend contract used by the object lifecycle.
#[async_trait]
pub trait BlobBackend: CapabilityIssuer {
    /// Remove the backing object. Removing an absent object is not an error.
    async fn delete_object(&self, object_name: &str) -> ObxResult<()>;
}

/// Reject object names that could escape their namespace, and zero TTLs.
pub fn validate_request(object_name: &str, ttl: Duration) -> ObxResult<()> {
    if object_name.is_empty() {
        return Err(ObxError::invalid_input("object name is empty"));
    }
    if object_name.starts_with('/')
        || object_name.ends_with('/')
        || object_name
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(ObxError::InvalidInput(format!(
            "object name {object_name:?} is not a valid key"
        )));
    }
    if ttl.is_zero() {
        return Err(ObxError::invalid_input("capability TTL must be non-zero"));
    }
    Ok(())
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn expiry_after(ttl: Duration) -> u64 {
    now_millis().saturating_add(ttl.as_millis() as u64)
}
