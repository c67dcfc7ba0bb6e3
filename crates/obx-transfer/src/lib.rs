//! obx-transfer: moves ciphertext between the client and capability URLs
//!
//! [`TransferClient`] runs every push/pull under one [`RetryPolicy`]
//! (exponential backoff, 3 retries, 1 s base) over a pluggable [`Transport`]:
//! reqwest for real endpoints, the in-process blob store for tests.

pub mod client;
pub mod http;
pub mod payload;
pub mod retry;
pub mod transport;

pub use client::{Pulled, TransferClient, BLOB_TYPE_HEADER, DEFAULT_CONTENT_TYPE};
pub use http::HttpTransport;
pub use payload::WirePayload;
pub use retry::{RetryError, RetryPolicy};
pub use transport::{FaultKind, RawResponse, Transport, TransportError};
