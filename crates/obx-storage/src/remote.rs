//! Record store over an OpenDAL operator: one JSON document per record at
//! `{prefix}/{owner_id}/{id}.json`.

use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use tracing::{debug, warn};

use obx_core::{ObjectRecord, ObxError, ObxResult};

use crate::records::{sort_newest_first, RecordStore};

pub struct RemoteRecordStore {
    op: Operator,
    prefix: String,
}

impl RemoteRecordStore {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn owner_dir(&self, owner_id: &str) -> String {
        format!("{}/{}/", self.prefix, owner_id)
    }

    fn record_path(&self, owner_id: &str, id: &str) -> String {
        format!("{}/{}/{}.json", self.prefix, owner_id, id)
    }

    async fn read_record(&self, path: &str) -> ObxResult<Option<ObjectRecord>> {
        let buf = match self.op.read(path).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ObxError::Storage(format!("reading {path}: {e}"))),
        };
        let record = serde_json::from_slice(&buf.to_vec())
            .map_err(|e| ObxError::Storage(format!("parsing {path}: {e}")))?;
        Ok(Some(record))
    }
}

#[async_trait]
impl RecordStore for RemoteRecordStore {
    async fn find_by_owner(&self, owner_id: &str) -> ObxResult<Vec<ObjectRecord>> {
        let dir = self.owner_dir(owner_id);
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ObxError::Storage(format!("listing {dir}: {e}"))),
        };

        let mut records = Vec::new();
        for entry in entries {
            if !entry.path().ends_with(".json") {
                continue;
            }
            match self.read_record(entry.path()).await {
                Ok(Some(record)) => records.push(record),
                // Deleted between list and read
                Ok(None) => {}
                Err(e) => warn!(path = %entry.path(), "skipping unreadable record: {e}"),
            }
        }
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn create(&self, record: ObjectRecord) -> ObxResult<ObjectRecord> {
        let path = self.record_path(&record.owner_id, &record.id);
        let json = serde_json::to_vec(&record)
            .map_err(|e| ObxError::Storage(format!("serializing {path}: {e}")))?;

        if self.op.info().full_capability().write_with_if_not_exists {
            match self.op.write_with(&path, json).if_not_exists(true).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::ConditionNotMatch => {
                    return Err(ObxError::AlreadyExists(format!("record {path}")));
                }
                Err(e) => return Err(ObxError::Storage(format!("writing {path}: {e}"))),
            }
        } else {
            // Best effort without conditional writes
            let exists = self
                .op
                .exists(&path)
                .await
                .map_err(|e| ObxError::Storage(format!("stat {path}: {e}")))?;
            if exists {
                return Err(ObxError::AlreadyExists(format!("record {path}")));
            }
            self.op
                .write(&path, json)
                .await
                .map_err(|e| ObxError::Storage(format!("writing {path}: {e}")))?;
        }

        debug!(path = %path, "record created");
        Ok(record)
    }

    async fn get_by_id(&self, owner_id: &str, id: &str) -> ObxResult<Option<ObjectRecord>> {
        self.read_record(&self.record_path(owner_id, id)).await
    }

    async fn delete(&self, owner_id: &str, id: &str) -> ObxResult<bool> {
        let path = self.record_path(owner_id, id);
        let exists = self
            .op
            .exists(&path)
            .await
            .map_err(|e| ObxError::Storage(format!("stat {path}: {e}")))?;
        if !exists {
            return Ok(false);
        }
        self.op
            .delete(&path)
            .await
            .map_err(|e| ObxError::Storage(format!("deleting {path}: {e}")))?;
        Ok(true)
    }
}
