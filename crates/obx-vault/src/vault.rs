//! Client-side pipeline: everything between a plaintext file and a
//! committed, encrypted object.
//!
//! ```text
//! upload:   reserve → seal (KDF + AES-GCM) → push → commit
//! download: fetch → pull → open
//! remove:   get → derive verifier → delete
//! ```
//!
//! The passphrase and derived key never leave this process.

use bytes::Bytes;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

use obx_core::{ObjectSummary, ObxError, ObxResult};
use obx_crypto::{derive_verifier, open, seal, KdfParams};
use obx_transfer::TransferClient;

use crate::lifecycle::{CommitRequest, ObjectLifecycle, ReserveRequest};

/// A decrypted object.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub object: ObjectSummary,
    pub plaintext: Vec<u8>,
}

pub struct Vault {
    lifecycle: Arc<ObjectLifecycle>,
    transfer: TransferClient,
    kdf: KdfParams,
}

impl Vault {
    pub fn new(lifecycle: Arc<ObjectLifecycle>, transfer: TransferClient, kdf: KdfParams) -> Self {
        Self {
            lifecycle,
            transfer,
            kdf,
        }
    }

    pub fn lifecycle(&self) -> &ObjectLifecycle {
        &self.lifecycle
    }

    /// Encrypt `plaintext` and store it as a new object.
    pub async fn upload(
        &self,
        owner_id: &str,
        passphrase: &SecretString,
        display_name: &str,
        mime_type: &str,
        plaintext: &[u8],
    ) -> ObxResult<ObjectSummary> {
        let reservation = self
            .lifecycle
            .reserve(
                owner_id,
                &ReserveRequest {
                    display_name: display_name.to_string(),
                    byte_size: plaintext.len() as u64,
                    mime_type: mime_type.to_string(),
                },
            )
            .await?;

        let sealed = seal(passphrase, plaintext, &self.kdf)?;
        self.transfer
            .push_to(
                &reservation.capability,
                Bytes::from(sealed.ciphertext),
                mime_type,
            )
            .await?;

        let summary = self
            .lifecycle
            .commit(
                owner_id,
                CommitRequest {
                    object_name: Some(reservation.object_name),
                    display_name: Some(display_name.to_string()),
                    byte_size: Some(plaintext.len() as u64),
                    mime_type: Some(mime_type.to_string()),
                    salt: Some(sealed.salt.to_base64()),
                    nonce: Some(sealed.nonce.to_base64()),
                    key_verifier: Some(sealed.verifier.to_base64()),
                },
            )
            .await?;

        info!(owner = %owner_id, id = %summary.id, size = summary.byte_size, "uploaded");
        Ok(summary)
    }

    /// Pull and decrypt one of the caller's objects.
    pub async fn download(
        &self,
        owner_id: &str,
        id: &str,
        passphrase: &SecretString,
    ) -> ObxResult<Downloaded> {
        let fetched = self.lifecycle.fetch(owner_id, id).await?;
        let pulled = self.transfer.pull(&fetched.capability.url).await?;

        let plaintext = open(
            passphrase,
            fetched.object.salt.as_bytes(),
            fetched.object.nonce.as_bytes(),
            &pulled.bytes,
            &self.kdf,
        )?;

        Ok(Downloaded {
            object: fetched.object,
            plaintext,
        })
    }

    /// Delete an object, proving knowledge of its passphrase when it was
    /// stored with a verifier.
    pub async fn remove(
        &self,
        owner_id: &str,
        id: &str,
        passphrase: Option<&SecretString>,
    ) -> ObxResult<()> {
        let object = match self.lifecycle.get(owner_id, id).await {
            Ok(object) => object,
            Err(ObxError::ObjectNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let verifier = match (object.has_verifier, passphrase) {
            (true, Some(pw)) => Some(derive_verifier(pw, object.salt.as_bytes(), &self.kdf)?),
            _ => None,
        };
        self.lifecycle.delete(owner_id, id, verifier.as_ref()).await
    }
}
