//! obx-storage: blob backends, capability URL issuance, and record stores
//!
//! Ciphertext never passes through this crate. It only hands out scoped,
//! time-bounded URLs ([`Capability`]) and persists [`obx_core::ObjectRecord`]s.

pub mod backend;
pub mod capability;
pub mod health;
pub mod memory;
pub mod operator;
pub mod records;
pub mod remote;

pub use backend::OpendalBackend;
pub use capability::{BlobBackend, Capability, CapabilityIssuer, Permission};
pub use health::check_health;
pub use memory::{MemoryBlobStore, MemoryResponse};
pub use operator::{check_endpoint_security, memory_operator, s3_operator, S3Credentials};
pub use records::{open_record_store, JsonRecordStore, RecordStore};
pub use remote::RemoteRecordStore;
