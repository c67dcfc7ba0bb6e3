//! Object record stores, keyed by (owner_id, id).
//!
//! Two backends:
//!   - **JSON** (default): whole set in memory, flushed atomically via
//!     temp+rename after every mutation.
//!   - **Remote**: one JSON document per record in an OpenDAL operator
//!     (see [`crate::remote`]).
//!
//! Both implement [`RecordStore`], so the lifecycle can use either.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use obx_core::config::{RecordBackend, RecordsConfig};
use obx_core::{ObjectRecord, ObxError, ObxResult};

use crate::remote::RemoteRecordStore;

/// Persistence for committed object records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records for `owner_id`, newest first.
    async fn find_by_owner(&self, owner_id: &str) -> ObxResult<Vec<ObjectRecord>>;

    /// Insert a new record. `AlreadyExists` if (owner_id, id) is taken.
    async fn create(&self, record: ObjectRecord) -> ObxResult<ObjectRecord>;

    async fn get_by_id(&self, owner_id: &str, id: &str) -> ObxResult<Option<ObjectRecord>>;

    /// Remove a record. Returns whether anything was removed.
    async fn delete(&self, owner_id: &str, id: &str) -> ObxResult<bool>;
}

type RecordKey = (String, String);

/// Newest first; ties broken by id so listings are stable.
pub(crate) fn sort_newest_first(records: &mut [ObjectRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// JSON-file record store.
pub struct JsonRecordStore {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<RecordKey, ObjectRecord>>,
}

impl JsonRecordStore {
    /// Load or create a store at `path`. A missing file starts empty.
    pub fn open(path: &Path) -> ObxResult<Self> {
        let records: Vec<ObjectRecord> = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading record store: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing record store: {}", path.display()))?
        } else {
            Vec::new()
        };

        debug!(path = %path.display(), records = records.len(), "record store opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(index(records)),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn flush(&self, entries: &HashMap<RecordKey, ObjectRecord>) -> ObxResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut records: Vec<&ObjectRecord> = entries.values().collect();
        records.sort_by(|a, b| (&a.owner_id, &a.id).cmp(&(&b.owner_id, &b.id)));
        let json = serde_json::to_string_pretty(&records).context("serializing record store")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating record dir: {}", parent.display()))?;
            }
        }

        // Atomic write: write to temp file, then rename
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)
            .with_context(|| format!("writing record store temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming record store: {}", path.display()))?;

        debug!(path = %path.display(), records = entries.len(), "record store flushed");
        Ok(())
    }
}

fn index(records: Vec<ObjectRecord>) -> HashMap<RecordKey, ObjectRecord> {
    records
        .into_iter()
        .map(|r| ((r.owner_id.clone(), r.id.clone()), r))
        .collect()
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn find_by_owner(&self, owner_id: &str) -> ObxResult<Vec<ObjectRecord>> {
        let entries = self.entries.lock().await;
        let mut records: Vec<ObjectRecord> = entries
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn create(&self, record: ObjectRecord) -> ObxResult<ObjectRecord> {
        let mut entries = self.entries.lock().await;
        let key = (record.owner_id.clone(), record.id.clone());
        if entries.contains_key(&key) {
            return Err(ObxError::AlreadyExists(format!(
                "record {}/{}",
                record.owner_id, record.id
            )));
        }
        entries.insert(key.clone(), record.clone());
        if let Err(e) = self.flush(&entries) {
            entries.remove(&key);
            return Err(e);
        }
        Ok(record)
    }

    async fn get_by_id(&self, owner_id: &str, id: &str) -> ObxResult<Option<ObjectRecord>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&(owner_id.to_string(), id.to_string()))
            .cloned())
    }

    async fn delete(&self, owner_id: &str, id: &str) -> ObxResult<bool> {
        let mut entries = self.entries.lock().await;
        let key = (owner_id.to_string(), id.to_string());
        let Some(removed) = entries.remove(&key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&entries) {
            entries.insert(key, removed);
            return Err(e);
        }
        Ok(true)
    }
}

/// Open the record store selected by `[records]`. The remote backend
/// shares the blob operator.
pub fn open_record_store(
    cfg: &RecordsConfig,
    op: &opendal::Operator,
) -> ObxResult<Arc<dyn RecordStore>> {
    match cfg.backend {
        RecordBackend::Json => {
            let path = expand_home(&cfg.path);
            Ok(Arc::new(JsonRecordStore::open(&path)?))
        }
        RecordBackend::Remote => Ok(Arc::new(RemoteRecordStore::new(op.clone(), &cfg.prefix))),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
