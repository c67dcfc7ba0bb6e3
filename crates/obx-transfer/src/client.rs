//! Push/pull ciphertext to and from capability URLs.
//!
//! Per call: attempt → success, or classify the failure. Only network
//! faults (timeouts, reset or aborted connections) retry under the
//! [`RetryPolicy`]. Any HTTP error status the endpoint answers with is
//! terminal. Stateless between calls.

use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use obx_core::{ObxError, ObxResult};
use obx_storage::Capability;

use crate::payload::WirePayload;
use crate::retry::{RetryError, RetryPolicy};
use crate::transport::{RawResponse, Transport};

/// Write-intent header honoured by block-blob style backends.
pub const BLOB_TYPE_HEADER: (&str, &str) = ("x-ms-blob-type", "BlockBlob");

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Bytes pulled from a read capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulled {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Outcome of one attempt that did not succeed.
#[derive(Debug)]
enum Fault {
    Transient(String),
    NotFound,
    Rejected { status: u16 },
    Broken(String),
}

impl Fault {
    fn is_retryable(&self) -> bool {
        matches!(self, Fault::Transient(_))
    }

    fn from_status(status: u16, pulling: bool) -> Self {
        match status {
            404 if pulling => Fault::NotFound,
            _ => Fault::Rejected { status },
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::Transient(reason) | Fault::Broken(reason) => f.write_str(reason),
            Fault::NotFound => f.write_str("object not found"),
            Fault::Rejected { status } => write!(f, "endpoint rejected request with {status}"),
        }
    }
}

#[derive(Clone)]
pub struct TransferClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl TransferClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload `bytes` to a write capability URL.
    pub async fn push(&self, url: &str, bytes: Bytes, content_type: &str) -> ObxResult<()> {
        self.push_with_headers(url, bytes, content_type, &[]).await
    }

    /// Upload to a capability, forwarding whatever headers its signer requires.
    pub async fn push_to(
        &self,
        capability: &Capability,
        bytes: Bytes,
        content_type: &str,
    ) -> ObxResult<()> {
        self.push_with_headers(&capability.url, bytes, content_type, &capability.headers)
            .await
    }

    /// Upload a payload received over a text-only wire.
    pub async fn push_payload(
        &self,
        url: &str,
        payload: WirePayload,
        content_type: &str,
    ) -> ObxResult<()> {
        self.push(url, payload.into_bytes(), content_type).await
    }

    async fn push_with_headers(
        &self,
        url: &str,
        bytes: Bytes,
        content_type: &str,
        extra: &[(String, String)],
    ) -> ObxResult<()> {
        validate_url(url)?;
        if bytes.is_empty() {
            return Err(ObxError::invalid_input("no data to upload"));
        }
        let content_type = match content_type.trim() {
            "" => DEFAULT_CONTENT_TYPE,
            given => given,
        };

        let mut headers = vec![
            ("Content-Type".to_string(), content_type.to_string()),
            (BLOB_TYPE_HEADER.0.to_string(), BLOB_TYPE_HEADER.1.to_string()),
        ];
        headers.extend(
            extra
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
                .cloned(),
        );

        let len = bytes.len();
        let (bytes, headers) = (&bytes, &headers);
        let result = self
            .policy
            .run(
                "push",
                move || {
                    let body = bytes.clone();
                    async move {
                        let resp = self
                            .transport
                            .put(url, body, headers)
                            .await
                            .map_err(fault_from_transport)?;
                        check(resp, false).map(|_| ())
                    }
                },
                Fault::is_retryable,
            )
            .await;

        match result {
            Ok(()) => {
                debug!(bytes = len, "push complete");
                Ok(())
            }
            Err(e) => Err(into_error(e, url)),
        }
    }

    /// Download from a read capability URL.
    pub async fn pull(&self, url: &str) -> ObxResult<Pulled> {
        validate_url(url)?;

        let result = self
            .policy
            .run(
                "pull",
                move || async move {
                    let resp = self
                        .transport
                        .get(url)
                        .await
                        .map_err(fault_from_transport)?;
                    check(resp, true)
                },
                Fault::is_retryable,
            )
            .await;

        match result {
            Ok(resp) => {
                debug!(bytes = resp.body.len(), "pull complete");
                Ok(Pulled {
                    bytes: resp.body,
                    content_type: resp.content_type,
                })
            }
            Err(e) => Err(into_error(e, url)),
        }
    }
}

fn validate_url(url: &str) -> ObxResult<()> {
    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|e| ObxError::InvalidInput(format!("capability URL is malformed: {e}")))
}

fn fault_from_transport(e: crate::transport::TransportError) -> Fault {
    if e.is_retryable() {
        Fault::Transient(e.to_string())
    } else {
        Fault::Broken(e.to_string())
    }
}

fn check(resp: RawResponse, pulling: bool) -> Result<RawResponse, Fault> {
    if resp.is_success() {
        Ok(resp)
    } else {
        Err(Fault::from_status(resp.status, pulling))
    }
}

/// Strip the signature before a URL goes into an error message.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or_default()
}

fn into_error(e: RetryError<Fault>, url: &str) -> ObxError {
    let RetryError { error, attempts } = e;
    match error {
        Fault::Transient(reason) | Fault::Broken(reason) => ObxError::TransferFailed {
            attempts,
            reason: format!("{}: {reason}", redact(url)),
        },
        Fault::NotFound => ObxError::ObjectNotFound(redact(url).to_string()),
        Fault::Rejected { status } => ObxError::TransferRejected {
            status: Some(status),
            reason: format!("{} refused the request", redact(url)),
        },
    }
}
