//! End-to-end lifecycle against the in-process blob store and record store.

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use obx_core::{KeyVerifier, ObxError, ObxResult};
use obx_crypto::{derive_verifier, open, KdfParams};
use obx_storage::{
    BlobBackend, Capability, CapabilityIssuer, JsonRecordStore, MemoryBlobStore, RecordStore,
};
use obx_transfer::{RetryPolicy, TransferClient};
use obx_vault::{CommitRequest, ObjectLifecycle, ReserveRequest, Vault};

const OWNER: &str = "alice";

fn fast_kdf() -> KdfParams {
    KdfParams { iterations: 1000 }
}

struct Harness {
    store: MemoryBlobStore,
    records: Arc<JsonRecordStore>,
    vault: Vault,
}

fn harness_with(lifecycle: impl FnOnce(ObjectLifecycle) -> ObjectLifecycle) -> Harness {
    let store = MemoryBlobStore::new("obx");
    let records = Arc::new(JsonRecordStore::in_memory());
    let lifecycle = lifecycle(ObjectLifecycle::new(
        Arc::new(store.clone()),
        records.clone(),
    ));
    let transfer = TransferClient::new(
        Arc::new(store.clone()),
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        },
    );
    Harness {
        vault: Vault::new(Arc::new(lifecycle), transfer, fast_kdf()),
        store,
        records,
    }
}

fn harness() -> Harness {
    harness_with(|l| l)
}

fn pw(s: &str) -> SecretString {
    SecretString::from(s)
}

fn reserve_req() -> ReserveRequest {
    ReserveRequest {
        display_name: "notes.txt".to_string(),
        byte_size: 13,
        mime_type: "text/plain".to_string(),
    }
}

fn commit_req(object_name: &str, verifier: Option<&KeyVerifier>) -> CommitRequest {
    CommitRequest {
        object_name: Some(object_name.to_string()),
        display_name: Some("notes.txt".to_string()),
        byte_size: Some(13),
        mime_type: Some("text/plain".to_string()),
        salt: Some("AAAAAAAAAAAAAAAAAAAAAA==".to_string()),
        nonce: Some("AAAAAAAAAAAAAAAA".to_string()),
        key_verifier: verifier.map(KeyVerifier::to_base64),
    }
}

#[tokio::test]
async fn upload_download_roundtrip() {
    let h = harness();
    let summary = h
        .vault
        .upload(OWNER, &pw("correct-horse"), "notes.txt", "text/plain", b"hello, world!")
        .await
        .unwrap();

    assert_eq!(summary.byte_size, 13);
    assert!(summary.has_verifier);
    assert!(summary.object_name.starts_with("alice/"));
    assert!(h.store.object(&summary.object_name).is_some());

    let got = h
        .vault
        .download(OWNER, &summary.id, &pw("correct-horse"))
        .await
        .unwrap();
    assert_eq!(got.plaintext, b"hello, world!");
    assert_eq!(got.object.display_name, "notes.txt");
}

#[tokio::test]
async fn stored_bytes_are_ciphertext() {
    let h = harness();
    let summary = h
        .vault
        .upload(OWNER, &pw("correct-horse"), "notes.txt", "text/plain", b"hello, world!")
        .await
        .unwrap();

    let stored = h.store.object(&summary.object_name).unwrap();
    assert_eq!(stored.len(), 13 + 16);
    assert!(!stored.windows(5).any(|w| w == b"hello"));
}

#[tokio::test]
async fn wrong_passphrase_and_tampering_look_the_same() {
    let h = harness();
    let summary = h
        .vault
        .upload(OWNER, &pw("correct-horse"), "notes.txt", "text/plain", b"hello, world!")
        .await
        .unwrap();

    let wrong = h
        .vault
        .download(OWNER, &summary.id, &pw("wrong"))
        .await
        .unwrap_err();

    let mut bytes = h.store.object(&summary.object_name).unwrap().to_vec();
    bytes[0] ^= 0xff;
    h.store.tamper(&summary.object_name, Bytes::from(bytes));
    let tampered = h
        .vault
        .download(OWNER, &summary.id, &pw("correct-horse"))
        .await
        .unwrap_err();

    assert!(matches!(wrong, ObxError::AuthenticationFailed));
    assert!(matches!(tampered, ObxError::AuthenticationFailed));
    assert_eq!(wrong.to_string(), "wrong key or corrupted data");
    assert_eq!(wrong.to_string(), tampered.to_string());
}

#[tokio::test]
async fn deletion_gate() {
    let h = harness();
    let summary = h
        .vault
        .upload(OWNER, &pw("correct-horse"), "notes.txt", "text/plain", b"hello, world!")
        .await
        .unwrap();
    let lifecycle = h.vault.lifecycle();
    let good = derive_verifier(&pw("correct-horse"), summary.salt.as_bytes(), &fast_kdf()).unwrap();
    let bad = derive_verifier(&pw("wrong"), summary.salt.as_bytes(), &fast_kdf()).unwrap();

    let err = lifecycle.delete(OWNER, &summary.id, None).await.unwrap_err();
    assert!(matches!(err, ObxError::VerificationRequired));

    let err = lifecycle
        .delete(OWNER, &summary.id, Some(&bad))
        .await
        .unwrap_err();
    assert!(matches!(err, ObxError::VerificationFailed));
    assert!(h.records.get_by_id(OWNER, &summary.id).await.unwrap().is_some());
    assert!(h.store.contains(&summary.object_name));

    lifecycle
        .delete(OWNER, &summary.id, Some(&good))
        .await
        .unwrap();
    assert!(h.records.get_by_id(OWNER, &summary.id).await.unwrap().is_none());
    assert!(!h.store.contains(&summary.object_name));

    // Second delete is a no-op
    lifecycle
        .delete(OWNER, &summary.id, Some(&good))
        .await
        .unwrap();
}

#[tokio::test]
async fn vault_remove_derives_the_verifier() {
    let h = harness();
    let summary = h
        .vault
        .upload(OWNER, &pw("correct-horse"), "notes.txt", "text/plain", b"data")
        .await
        .unwrap();

    let err = h
        .vault
        .remove(OWNER, &summary.id, Some(&pw("wrong")))
        .await
        .unwrap_err();
    assert!(matches!(err, ObxError::VerificationFailed));

    let err = h.vault.remove(OWNER, &summary.id, None).await.unwrap_err();
    assert!(matches!(err, ObxError::VerificationRequired));

    h.vault
        .remove(OWNER, &summary.id, Some(&pw("correct-horse")))
        .await
        .unwrap();
    h.vault
        .remove(OWNER, &summary.id, Some(&pw("correct-horse")))
        .await
        .unwrap();
    assert!(h.vault.lifecycle().list(OWNER).await.unwrap().is_empty());
}

#[tokio::test]
async fn legacy_record_without_verifier() {
    let h = harness();
    let reservation = h.vault.lifecycle().reserve(OWNER, &reserve_req()).await.unwrap();
    let summary = h
        .vault
        .lifecycle()
        .commit(OWNER, commit_req(&reservation.object_name, None))
        .await
        .unwrap();
    assert!(!summary.has_verifier);

    h.vault
        .lifecycle()
        .delete(OWNER, &summary.id, None)
        .await
        .unwrap();
    assert!(h.records.is_empty().await);
}

#[tokio::test]
async fn legacy_delete_can_be_refused() {
    let h = harness_with(|l| l.require_verifier(true));
    let reservation = h.vault.lifecycle().reserve(OWNER, &reserve_req()).await.unwrap();
    let summary = h
        .vault
        .lifecycle()
        .commit(OWNER, commit_req(&reservation.object_name, None))
        .await
        .unwrap();

    let err = h
        .vault
        .lifecycle()
        .delete(OWNER, &summary.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ObxError::VerificationRequired));
    assert!(!h.records.is_empty().await);
}

#[tokio::test]
async fn commit_without_push_fails_distinctly_on_read() {
    let h = harness();
    let lifecycle = h.vault.lifecycle();
    let reservation = lifecycle.reserve(OWNER, &reserve_req()).await.unwrap();
    let summary = lifecycle
        .commit(OWNER, commit_req(&reservation.object_name, None))
        .await
        .unwrap();

    // Metadata exists, so fetch succeeds
    let fetched = lifecycle.fetch(OWNER, &summary.id).await.unwrap();
    assert_eq!(fetched.object.id, summary.id);

    // The backing object never arrived
    let transfer = TransferClient::new(Arc::new(h.store.clone()), RetryPolicy::no_retry());
    let err = transfer.pull(&fetched.capability.url).await.unwrap_err();
    assert!(matches!(err, ObxError::ObjectNotFound(_)));

    // Decrypting what was (not) pulled is an input error, not an auth failure
    let err = open(
        &pw("correct-horse"),
        summary.salt.as_bytes(),
        summary.nonce.as_bytes(),
        &[],
        &fast_kdf(),
    )
    .unwrap_err();
    assert!(matches!(err, ObxError::InvalidInput(_)));
}

#[tokio::test]
async fn double_commit_rejected() {
    let h = harness();
    let lifecycle = h.vault.lifecycle();
    let reservation = lifecycle.reserve(OWNER, &reserve_req()).await.unwrap();

    lifecycle
        .commit(OWNER, commit_req(&reservation.object_name, None))
        .await
        .unwrap();
    let err = lifecycle
        .commit(OWNER, commit_req(&reservation.object_name, None))
        .await
        .unwrap_err();
    assert!(matches!(err, ObxError::AlreadyExists(_)));
}

#[tokio::test]
async fn commit_validation() {
    let h = harness();
    let lifecycle = h.vault.lifecycle();
    let reservation = lifecycle.reserve(OWNER, &reserve_req()).await.unwrap();
    let base = commit_req(&reservation.object_name, None);

    let cases: Vec<CommitRequest> = vec![
        CommitRequest {
            salt: None,
            ..base.clone()
        },
        CommitRequest {
            nonce: None,
            ..base.clone()
        },
        CommitRequest {
            byte_size: Some(0),
            ..base.clone()
        },
        CommitRequest {
            display_name: Some(String::new()),
            ..base.clone()
        },
        CommitRequest {
            salt: Some("AAAA".to_string()),
            ..base.clone()
        },
        CommitRequest {
            object_name: Some("bob/1-abc".to_string()),
            ..base.clone()
        },
    ];
    for req in cases {
        let err = lifecycle.commit(OWNER, req.clone()).await.unwrap_err();
        assert!(matches!(err, ObxError::InvalidInput(_)), "{req:?}");
    }
    assert!(h.records.is_empty().await);
}

#[tokio::test]
async fn reserve_validation() {
    let h = harness();
    let lifecycle = h.vault.lifecycle();
    for req in [
        ReserveRequest {
            display_name: " ".into(),
            ..reserve_req()
        },
        ReserveRequest {
            byte_size: 0,
            ..reserve_req()
        },
        ReserveRequest {
            mime_type: String::new(),
            ..reserve_req()
        },
    ] {
        let err = lifecycle.reserve(OWNER, &req).await.unwrap_err();
        assert!(matches!(err, ObxError::InvalidInput(_)));
    }
    assert!(!h.store.container_exists());

    let err = lifecycle.reserve("../x", &reserve_req()).await.unwrap_err();
    assert!(matches!(err, ObxError::InvalidInput(_)));
}

#[tokio::test]
async fn owners_are_isolated() {
    let h = harness();
    let summary = h
        .vault
        .upload(OWNER, &pw("correct-horse"), "notes.txt", "text/plain", b"mine")
        .await
        .unwrap();
    let lifecycle = h.vault.lifecycle();

    assert!(matches!(
        lifecycle.fetch("mallory", &summary.id).await.unwrap_err(),
        ObxError::ObjectNotFound(_)
    ));
    assert!(matches!(
        lifecycle.get("mallory", &summary.id).await.unwrap_err(),
        ObxError::ObjectNotFound(_)
    ));
    assert!(lifecycle.list("mallory").await.unwrap().is_empty());

    // Someone else's "delete" is a no-op on a record they can't see
    lifecycle.delete("mallory", &summary.id, None).await.unwrap();
    assert_eq!(lifecycle.list(OWNER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn traversal_ids_are_refused_before_lookup() {
    let op = obx_storage::memory_operator().unwrap();
    let lifecycle = ObjectLifecycle::new(
        Arc::new(MemoryBlobStore::new("obx")),
        Arc::new(obx_storage::RemoteRecordStore::new(op, "records")),
    );
    let victim = lifecycle
        .reserve("bob", &reserve_req())
        .await
        .unwrap();
    let committed = lifecycle
        .commit("bob", commit_req(&victim.object_name, None))
        .await
        .unwrap();

    let sneaky = format!("../bob/{}", committed.id);
    for id in [sneaky.as_str(), "..", "a/b"] {
        assert!(matches!(
            lifecycle.fetch(OWNER, id).await.unwrap_err(),
            ObxError::InvalidInput(_)
        ));
        assert!(matches!(
            lifecycle.get(OWNER, id).await.unwrap_err(),
            ObxError::InvalidInput(_)
        ));
        assert!(matches!(
            lifecycle.delete(OWNER, id, None).await.unwrap_err(),
            ObxError::InvalidInput(_)
        ));
    }
    assert_eq!(lifecycle.list("bob").await.unwrap().len(), 1);
}

#[tokio::test]
async fn list_is_newest_first() {
    let h = harness();
    let mut ids = Vec::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        let s = h
            .vault
            .upload(OWNER, &pw("pw"), name, "text/plain", b"x")
            .await
            .unwrap();
        ids.push(s.id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let listed: Vec<String> = h
        .vault
        .lifecycle()
        .list(OWNER)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    ids.reverse();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn expired_write_capability_is_rejected_without_retry() {
    let h = harness();
    let lifecycle = h.vault.lifecycle();
    let reservation = lifecycle.reserve(OWNER, &reserve_req()).await.unwrap();
    h.store.expire_capabilities();

    let transfer = TransferClient::new(Arc::new(h.store.clone()), RetryPolicy::default());
    let err = transfer
        .push_to(&reservation.capability, Bytes::from_static(b"ct"), "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ObxError::TransferRejected {
            status: Some(403),
            ..
        }
    ));
}

/// Blob backend whose deletes always fail.
struct FlakyDelete(MemoryBlobStore);

#[async_trait]
impl CapabilityIssuer for FlakyDelete {
    async fn issue_write_capability(&self, name: &str, ttl: Duration) -> ObxResult<Capability> {
        self.0.issue_write_capability(name, ttl).await
    }

    async fn issue_read_capability(&self, name: &str, ttl: Duration) -> ObxResult<Capability> {
        self.0.issue_read_capability(name, ttl).await
    }
}

#[async_trait]
impl BlobBackend for FlakyDelete {
    async fn delete_object(&self, _name: &str) -> ObxResult<()> {
        Err(ObxError::Storage("backend unavailable".to_string()))
    }
}

#[tokio::test]
async fn backend_delete_failure_still_removes_record() {
    let store = MemoryBlobStore::new("obx");
    let records = Arc::new(JsonRecordStore::in_memory());
    let lifecycle = ObjectLifecycle::new(Arc::new(FlakyDelete(store.clone())), records.clone());

    let reservation = lifecycle.reserve(OWNER, &reserve_req()).await.unwrap();
    let summary = lifecycle
        .commit(OWNER, commit_req(&reservation.object_name, None))
        .await
        .unwrap();

    lifecycle.delete(OWNER, &summary.id, None).await.unwrap();
    assert!(records.is_empty().await);
}
