//! Recording store for pipeline tests.

use std::{collections::HashSet, path::Path};

use async_trait::async_trait;

use super::{ArchiveStore, FilesystemArchiveStore, StorageError, StorageResult, StoredObject};
use crate::{config::FilesystemStorageConfig, db::testing::EventLog};

/// Filesystem store that logs uploads and can be told to fail.
pub(crate) struct RecordingStore {
    inner: FilesystemArchiveStore,
    events: EventLog,
    failing_uploads: HashSet<String>,
    hidden: HashSet<String>,
    missing_bucket: bool,
}

impl RecordingStore {
    pub(crate) fn new(dir: &Path, events: EventLog) -> Self {
        let inner = FilesystemArchiveStore::new(FilesystemStorageConfig {
            path: dir.to_string_lossy().to_string(),
            create_dir: true,
        })
        .unwrap();
        Self {
            inner,
            events,
            failing_uploads: HashSet::new(),
            hidden: HashSet::new(),
            missing_bucket: false,
        }
    }

    pub(crate) fn failing_upload(mut self, key: &str) -> Self {
        self.failing_uploads.insert(key.to_string());
        self
    }

    /// Uploads of `key` succeed but `stat` never sees the object.
    pub(crate) fn hiding(mut self, key: &str) -> Self {
        self.hidden.insert(key.to_string());
        self
    }

    pub(crate) fn missing_bucket(mut self) -> Self {
        self.missing_bucket = true;
        self
    }
}

#[async_trait]
impl ArchiveStore for RecordingStore {
    fn object_key(&self, table: &str) -> String {
        self.inner.object_key(table)
    }

    async fn upload(&self, key: &str, path: &Path) -> StorageResult<StoredObject> {
        if self.failing_uploads.contains(key) {
            self.events.lock().unwrap().push(format!("upload-failed:{key}"));
            return Err(StorageError::Gcs("503 Service Unavailable: try again".into()));
        }
        let stored = self.inner.upload(key, path).await?;
        self.events.lock().unwrap().push(format!("upload:{key}"));
        Ok(stored)
    }

    async fn stat(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        if self.hidden.contains(key) {
            return Ok(None);
        }
        self.inner.stat(key).await
    }

    async fn check_bucket(&self) -> StorageResult<()> {
        if self.missing_bucket {
            return Err(StorageError::NotFound(self.inner.bucket().to_string()));
        }
        self.inner.check_bucket().await
    }

    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}
