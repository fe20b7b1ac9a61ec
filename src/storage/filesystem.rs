use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{ArchiveStore, StorageError, StorageResult, StoredObject};
use crate::config::FilesystemStorageConfig;

/// Filesystem archive storage backend.
///
/// Archives are stored as `{path}/{key}`.
pub struct FilesystemArchiveStore {
    config: FilesystemStorageConfig,
}

impl FilesystemArchiveStore {
    pub fn new(config: FilesystemStorageConfig) -> StorageResult<Self> {
        let store = Self { config };

        if store.config.create_dir {
            let path = Path::new(&store.config.path);
            if !path.exists() {
                info!(path = %store.config.path, "Creating archive storage directory");
                std::fs::create_dir_all(path)?;
            }
        }

        Ok(store)
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.config.object_path(key)
    }
}

#[async_trait]
impl ArchiveStore for FilesystemArchiveStore {
    fn object_key(&self, table: &str) -> String {
        table.to_string()
    }

    #[instrument(skip(self, path), fields(bucket = %self.config.path))]
    async fn upload(&self, key: &str, path: &Path) -> StorageResult<StoredObject> {
        let target = self.object_path(key);
        debug!(key, source = %path.display(), target = %target.display(), "Copying archive");

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Copy next to the target, then rename over it
        let mut partial = target.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let size = tokio::fs::copy(path, &partial).await?;
        tokio::fs::rename(&partial, &target).await?;

        info!(key, size, path = %target.display(), "Archive stored");
        Ok(StoredObject {
            bucket: self.config.path.clone(),
            key: key.to_string(),
            size,
        })
    }

    #[instrument(skip(self))]
    async fn stat(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        match tokio::fs::metadata(self.object_path(key)).await {
            Ok(meta) if meta.is_file() => Ok(Some(StoredObject {
                bucket: self.config.path.clone(),
                key: key.to_string(),
                size: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn check_bucket(&self) -> StorageResult<()> {
        match tokio::fs::metadata(&self.config.path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::Config(format!(
                "{} is not a directory",
                self.config.path
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(self.config.path.clone()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn bucket(&self) -> &str {
        &self.config.path
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
