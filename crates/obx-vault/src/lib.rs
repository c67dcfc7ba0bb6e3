//! obx-vault: the object lifecycle protocol and the client vault pipeline
//!
//! [`ObjectLifecycle`] is the server-side half: it names objects, hands out
//! capabilities, persists records and gates deletion on the key verifier.
//! It never sees plaintext or keys. [`Vault`] is the client-side half that
//! drives it together with obx-crypto and obx-transfer.

pub mod lifecycle;
pub mod vault;

pub use lifecycle::{CommitRequest, Fetched, ObjectLifecycle, Reservation, ReserveRequest};
pub use vault::{Downloaded, Vault};
