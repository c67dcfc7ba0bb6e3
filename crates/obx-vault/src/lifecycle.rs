//! Object lifecycle: reserve → (client pushes ciphertext) → commit, then
//! fetch and verifier-gated delete.
//!
//! Nothing is persisted until commit, so an abandoned reserve or fetch needs
//! no cleanup. Records are never updated in place.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use obx_core::config::CapabilityConfig;
use obx_core::types::{validate_owner_id, validate_record_id};
use obx_core::{KeyVerifier, Nonce, ObjectRecord, ObjectSummary, ObxError, ObxResult, Salt};
use obx_storage::{BlobBackend, Capability, RecordStore};

/// What the caller wants to upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub display_name: String,
    pub byte_size: u64,
    pub mime_type: String,
}

/// An allocated, not yet committed object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub object_name: String,
    pub capability: Capability,
}

/// Completion message sent after the ciphertext upload succeeded.
///
/// Every field is optional on the wire so a missing one is reported as
/// `InvalidInput` rather than a parse failure. Byte fields are base64.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitRequest {
    pub object_name: Option<String>,
    pub display_name: Option<String>,
    pub byte_size: Option<u64>,
    pub mime_type: Option<String>,
    pub salt: Option<String>,
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_verifier: Option<String>,
}

/// A read capability for a committed object, with what's needed to decrypt it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fetched {
    pub capability: Capability,
    pub object: ObjectSummary,
}

pub struct ObjectLifecycle {
    backend: Arc<dyn BlobBackend>,
    records: Arc<dyn RecordStore>,
    ttls: CapabilityConfig,
    require_verifier: bool,
}

impl ObjectLifecycle {
    pub fn new(backend: Arc<dyn BlobBackend>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            backend,
            records,
            ttls: CapabilityConfig::default(),
            require_verifier: false,
        }
    }

    pub fn with_ttls(mut self, ttls: CapabilityConfig) -> Self {
        self.ttls = ttls;
        self
    }

    /// Refuse to delete legacy records that carry no stored verifier.
    pub fn require_verifier(mut self, required: bool) -> Self {
        self.require_verifier = required;
        self
    }

    /// Allocate an object name and hand out a write capability for it.
    pub async fn reserve(&self, owner_id: &str, req: &ReserveRequest) -> ObxResult<Reservation> {
        validate_owner_id(owner_id)?;
        if req.display_name.trim().is_empty() {
            return Err(ObxError::invalid_input("display name is required"));
        }
        if req.byte_size == 0 {
            return Err(ObxError::invalid_input("size must be greater than zero"));
        }
        if req.mime_type.trim().is_empty() {
            return Err(ObxError::invalid_input("mime type is required"));
        }

        let object_name = format!("{owner_id}/{}", new_record_id());
        let capability = self
            .backend
            .issue_write_capability(&object_name, self.ttls.upload_ttl())
            .await?;

        info!(owner = %owner_id, object = %object_name, size = req.byte_size, "reserved");
        Ok(Reservation {
            object_name,
            capability,
        })
    }

    /// Persist the record for an uploaded object.
    pub async fn commit(&self, owner_id: &str, req: CommitRequest) -> ObxResult<ObjectSummary> {
        validate_owner_id(owner_id)?;

        let object_name = required(req.object_name, "objectName")?;
        let display_name = required(req.display_name, "displayName")?;
        let mime_type = required(req.mime_type, "mimeType")?;
        let byte_size = match req.byte_size {
            Some(n) if n > 0 => n,
            _ => return Err(ObxError::invalid_input("missing field: byteSize")),
        };
        let salt = Salt::from_base64(&required(req.salt, "salt")?)?;
        let nonce = Nonce::from_base64(&required(req.nonce, "nonce")?)?;
        let key_verifier = match req.key_verifier.filter(|v| !v.trim().is_empty()) {
            Some(encoded) => Some(KeyVerifier::from_base64(&encoded)?),
            None => None,
        };

        let id = record_id_for(owner_id, &object_name)?;
        let record = ObjectRecord {
            id,
            owner_id: owner_id.to_string(),
            object_name,
            display_name,
            byte_size,
            mime_type,
            salt,
            nonce,
            key_verifier,
            created_at: now_millis(),
        };

        let record = self.records.create(record).await?;
        info!(
            owner = %owner_id,
            id = %record.id,
            verifier = record.key_verifier.is_some(),
            "committed"
        );
        Ok(record.summary())
    }

    /// Issue a download capability for one of the caller's records.
    pub async fn fetch(&self, owner_id: &str, id: &str) -> ObxResult<Fetched> {
        let record = self.owned(owner_id, id).await?;
        let capability = self
            .backend
            .issue_read_capability(&record.object_name, self.ttls.download_ttl())
            .await?;
        debug!(owner = %owner_id, id = %id, "issued download capability");
        Ok(Fetched {
            capability,
            object: record.summary(),
        })
    }

    /// Short-lived read capability, e.g. for sharing a link to the ciphertext.
    pub async fn link(&self, owner_id: &str, id: &str) -> ObxResult<Capability> {
        let record = self.owned(owner_id, id).await?;
        self.backend
            .issue_read_capability(&record.object_name, self.ttls.read_ttl())
            .await
    }

    /// Delete a record and its backing object.
    ///
    /// A stored verifier must be matched by `supplied`. Records without one
    /// are deleted unauthenticated unless [`Self::require_verifier`] is set.
    /// Deleting something already gone succeeds.
    pub async fn delete(
        &self,
        owner_id: &str,
        id: &str,
        supplied: Option<&KeyVerifier>,
    ) -> ObxResult<()> {
        validate_owner_id(owner_id)?;
        validate_record_id(id)?;
        let Some(record) = self.records.get_by_id(owner_id, id).await? else {
            debug!(owner = %owner_id, id = %id, "delete: record already absent");
            return Ok(());
        };

        match (&record.key_verifier, supplied) {
            (Some(_), None) => return Err(ObxError::VerificationRequired),
            (Some(stored), Some(given)) if stored != given => {
                return Err(ObxError::VerificationFailed)
            }
            (Some(_), Some(_)) => {}
            (None, _) if self.require_verifier => return Err(ObxError::VerificationRequired),
            (None, _) => {
                warn!(owner = %owner_id, id = %id, "deleting legacy record without key verifier");
            }
        }

        // Blob delete failure is logged, not fatal: the record still goes
        if let Err(e) = self.backend.delete_object(&record.object_name).await {
            warn!(object = %record.object_name, "backend delete failed, continuing: {e}");
        }
        self.records.delete(owner_id, id).await?;

        info!(owner = %owner_id, id = %id, "deleted");
        Ok(())
    }

    /// The caller's records, newest first, without stored verifiers.
    pub async fn list(&self, owner_id: &str) -> ObxResult<Vec<ObjectSummary>> {
        validate_owner_id(owner_id)?;
        let records = self.records.find_by_owner(owner_id).await?;
        Ok(records.iter().map(ObjectRecord::summary).collect())
    }

    pub async fn get(&self, owner_id: &str, id: &str) -> ObxResult<ObjectSummary> {
        Ok(self.owned(owner_id, id).await?.summary())
    }

    async fn owned(&self, owner_id: &str, id: &str) -> ObxResult<ObjectRecord> {
        validate_owner_id(owner_id)?;
        validate_record_id(id)?;
        self.records
            .get_by_id(owner_id, id)
            .await?
            .ok_or_else(|| ObxError::ObjectNotFound(id.to_string()))
    }
}

fn required(field: Option<String>, name: &str) -> ObxResult<String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ObxError::InvalidInput(format!("missing field: {name}"))),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `{unixMillis}-{12 hex chars}`
fn new_record_id() -> String {
    let mut suffix = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut suffix);
    let hex: String = suffix.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{hex}", now_millis())
}

/// The record id is the object name minus the owner prefix. Names outside
/// the caller's namespace are refused.
fn record_id_for(owner_id: &str, object_name: &str) -> ObxResult<String> {
    match object_name
        .strip_prefix(owner_id)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        Some(id) if validate_record_id(id).is_ok() => Ok(id.to_string()),
        _ => Err(ObxError::InvalidInput(format!(
            "object name {object_name:?} does not belong to this owner"
        ))),
    }
}
