//! obx-core: shared types, config schema and error taxonomy for opaquebox

pub mod config;
pub mod error;
pub mod types;

pub use error::{ObxError, ObxResult};
pub use types::{KeyVerifier, Nonce, ObjectRecord, ObjectSummary, Salt};
