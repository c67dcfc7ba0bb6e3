//! reqwest transport for presigned HTTP(S) capability URLs

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::error::Error as _;
use std::io::ErrorKind;
use std::time::Duration;

use obx_core::config::TransferConfig;

use crate::transport::{FaultKind, RawResponse, Transport, TransportError};

pub struct HttpTransport {
    client: reqwest::Client,
    upload_timeout: Duration,
    download_timeout: Duration,
}

impl HttpTransport {
    pub fn new(upload_timeout: Duration, download_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_timeout,
            download_timeout,
        }
    }

    pub fn from_config(cfg: &TransferConfig) -> Self {
        Self::new(cfg.upload_timeout(), cfg.download_timeout())
    }

    fn user_agent() -> String {
        format!("obx-transfer/{}", env!("CARGO_PKG_VERSION"))
    }

    async fn finish(resp: reqwest::Response) -> Result<RawResponse, TransportError> {
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await.map_err(classify)?;
        Ok(RawResponse {
            status,
            body,
            content_type,
        })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        let mut req = self
            .client
            .put(url)
            .timeout(self.upload_timeout)
            .header("User-Agent", Self::user_agent());
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req.body(body).send().await.map_err(classify)?;
        Self::finish(resp).await
    }

    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .header("User-Agent", Self::user_agent())
            .send()
            .await
            .map_err(classify)?;
        Self::finish(resp).await
    }
}

/// Map a reqwest failure onto the retry classification. Only timeouts and
/// dropped connections are transient; DNS, TLS, refused connections and
/// malformed requests are not.
///
/// The message never carries the request URL: a capability URL is a bearer
/// token and this text ends up in retry logs and error reasons.
fn classify(err: reqwest::Error) -> TransportError {
    let kind = fault_kind(&err);
    TransportError::new(kind, err.without_url().to_string())
}

fn fault_kind(err: &reqwest::Error) -> FaultKind {
    if err.is_timeout() {
        return FaultKind::Timeout;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                ErrorKind::TimedOut => return FaultKind::Timeout,
                ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                    return FaultKind::ConnectionReset
                }
                ErrorKind::ConnectionAborted | ErrorKind::UnexpectedEof => {
                    return FaultKind::ConnectionAborted
                }
                _ => {}
            }
        }
        source = cause.source();
    }

    FaultKind::Other
}
