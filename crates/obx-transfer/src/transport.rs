//! The raw PUT/GET seam under the transfer client.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use obx_storage::MemoryBlobStore;

/// One HTTP-like response from a capability endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// What went wrong below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Timeout,
    ConnectionReset,
    ConnectionAborted,
    Other,
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: FaultKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(FaultKind::Timeout, "request timed out")
    }

    /// Transient network conditions worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, FaultKind::Other)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<RawResponse, TransportError>;

    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        (**self).put(url, body, headers).await
    }

    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        (**self).get(url).await
    }
}

/// Serve `memory://` capability URLs straight from the in-process store.
#[async_trait]
impl Transport for MemoryBlobStore {
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        let content_type = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str());
        let resp = self.handle_put(url, body, content_type);
        Ok(RawResponse {
            status: resp.status,
            body: resp.body,
            content_type: resp.content_type,
        })
    }

    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let resp = self.handle_get(url);
        Ok(RawResponse {
            status: resp.status,
            body: resp.body,
            content_type: resp.content_type,
        })
    }
}
