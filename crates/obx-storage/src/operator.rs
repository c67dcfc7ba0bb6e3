//! Operator construction: S3-compatible stores for real use, the in-process
//! Memory service for tests and offline runs.

use opendal::Operator;
use std::fmt;

use obx_core::config::StorageConfig;
use obx_core::{ObxError, ObxResult};

/// S3 access keys. Never printed.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl S3Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, falling back to the
    /// `OBX_` prefixed pair.
    pub fn from_env() -> ObxResult<Self> {
        let lookup = |name: &str| {
            std::env::var(format!("AWS_{name}"))
                .or_else(|_| std::env::var(format!("OBX_{name}")))
                .ok()
                .filter(|v| !v.is_empty())
        };
        match (lookup("ACCESS_KEY_ID"), lookup("SECRET_ACCESS_KEY")) {
            (Some(id), Some(secret)) => Ok(Self::new(id, secret)),
            _ => Err(ObxError::Config(
                "S3 credentials not set: export AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".into(),
            )),
        }
    }
}

/// Refuse a plaintext endpoint when `enforce_tls` is set, warn otherwise.
///
/// Capability URLs are bearer tokens, so anything that travels over plain
/// HTTP can be replayed by an observer.
pub fn check_endpoint_security(storage: &StorageConfig) -> ObxResult<()> {
    if !storage.endpoint.starts_with("http://") {
        return Ok(());
    }
    if storage.enforce_tls {
        return Err(ObxError::Config(format!(
            "endpoint {} is plaintext HTTP but storage.enforce_tls is set",
            storage.endpoint
        )));
    }
    tracing::warn!(
        endpoint = %storage.endpoint,
        "plaintext HTTP endpoint; capability URLs and ciphertext travel unencrypted"
    );
    Ok(())
}

/// S3 operator for the configured bucket.
///
/// Path-style addressing is the opendal 0.55 default and what MinIO-style
/// self-hosted stores expect. No RetryLayer: transfers retry in
/// obx-transfer and metadata calls fail fast.
pub fn s3_operator(storage: &StorageConfig, creds: &S3Credentials) -> ObxResult<Operator> {
    check_endpoint_security(storage)?;

    let builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(&creds.secret_access_key);

    let op = Operator::new(builder)
        .map_err(|e| ObxError::Storage(format!("building S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// Process-local operator; contents vanish with the process.
pub fn memory_operator() -> ObxResult<Operator> {
    Operator::new(opendal::services::Memory::default())
        .map(|b| b.finish())
        .map_err(|e| ObxError::Storage(format!("building memory operator: {e}")))
}
