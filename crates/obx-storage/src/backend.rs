//! OpenDAL-backed blob backend: presigned S3 URLs as capabilities

use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use obx_core::{ObxError, ObxResult};

use crate::capability::{
    expiry_after, validate_request, BlobBackend, Capability, CapabilityIssuer, Permission,
};

/// Blob backend over any presign-capable OpenDAL operator (S3 and friends).
///
/// Objects live at `{container}/{object_name}`. The container prefix is
/// provisioned lazily, once per process, on the first write capability.
pub struct OpendalBackend {
    op: Operator,
    container: String,
    provisioned: OnceCell<()>,
}

impl OpendalBackend {
    pub fn new(op: Operator, container: impl Into<String>) -> Self {
        Self {
            op,
            container: container.into().trim_matches('/').to_string(),
            provisioned: OnceCell::new(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn object_path(&self, object_name: &str) -> String {
        format!("{}/{}", self.container, object_name)
    }

    /// Make sure the container exists. A concurrent creator winning the
    /// race is fine.
    pub async fn ensure_container(&self) -> ObxResult<()> {
        self.provisioned
            .get_or_try_init(|| async {
                let dir = format!("{}/", self.container);
                match self.op.create_dir(&dir).await {
                    Ok(()) => {
                        info!(container = %self.container, "container ready");
                        Ok(())
                    }
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        debug!(container = %self.container, "container provisioned concurrently");
                        Ok(())
                    }
                    Err(e) => Err(ObxError::Storage(format!(
                        "creating container {}: {e}",
                        self.container
                    ))),
                }
            })
            .await
            .map(|_| ())
    }

    async fn presign(
        &self,
        object_name: &str,
        permission: Permission,
        ttl: Duration,
    ) -> ObxResult<Capability> {
        let path = self.object_path(object_name);
        let signed = match permission {
            Permission::Write => self.op.presign_write(&path, ttl).await,
            Permission::Read => self.op.presign_read(&path, ttl).await,
        }
        .map_err(|e| ObxError::Storage(format!("presigning {permission:?} for {path}: {e}")))?;

        let headers = signed
            .header()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Ok(Capability {
            url: signed.uri().to_string(),
            object_name: object_name.to_string(),
            permission,
            expires_at: expiry_after(ttl),
            headers,
        })
    }
}

#[async_trait]
impl CapabilityIssuer for OpendalBackend {
    async fn issue_write_capability(
        &self,
        object_name: &str,
        ttl: Duration,
    ) -> ObxResult<Capability> {
        validate_request(object_name, ttl)?;
        self.ensure_container().await?;
        let cap = self.presign(object_name, Permission::Write, ttl).await?;
        debug!(object = %object_name, ttl_secs = ttl.as_secs(), "issued write capability");
        Ok(cap)
    }

    async fn issue_read_capability(
        &self,
        object_name: &str,
        ttl: Duration,
    ) -> ObxResult<Capability> {
        validate_request(object_name, ttl)?;
        let cap = self.presign(object_name, Permission::Read, ttl).await?;
        debug!(object = %object_name, ttl_secs = ttl.as_secs(), "issued read capability");
        Ok(cap)
    }
}

#[async_trait]
impl BlobBackend for OpendalBackend {
    async fn delete_object(&self, object_name: &str) -> ObxResult<()> {
        let path = self.object_path(object_name);
        // OpenDAL treats deleting a missing key as success
        self.op
            .delete(&path)
            .await
            .map_err(|e| ObxError::Storage(format!("deleting {path}: {e}")))
    }
}
