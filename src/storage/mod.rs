//! Pluggable object storage for uploaded archives.
//!
//! - **GCS**: Google Cloud Storage JSON API (default)
//! - **S3**: S3-compatible object storage (`s3-storage` feature)
//! - **Filesystem**: a local directory
//!
//! The choice of backend is configured via `[storage]` in the config.

mod filesystem;
#[cfg(feature = "gcs-storage")]
mod gcs;
#[cfg(feature = "s3-storage")]
mod s3;
#[cfg(test)]
pub(crate) mod testing;

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
pub use filesystem::FilesystemArchiveStore;
#[cfg(feature = "gcs-storage")]
pub use gcs::GcsArchiveStore;
#[cfg(feature = "s3-storage")]
pub use s3::S3ArchiveStore;
use thiserror::Error;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GCS error: {0}")]
    Gcs(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// An archive as it exists in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Object key an archive for `table` is stored under.
    fn object_key(&self, table: &str) -> String;

    /// Upload the file at `path` under `key`, replacing any existing object.
    async fn upload(&self, key: &str, path: &Path) -> StorageResult<StoredObject>;

    /// Metadata for `key`, or `None` if no such object exists.
    async fn stat(&self, key: &str) -> StorageResult<Option<StoredObject>>;

    /// Fails unless the bucket exists and is reachable with the configured
    /// credentials.
    async fn check_bucket(&self) -> StorageResult<()>;

    /// Bucket (or directory) archives are written to.
    fn bucket(&self) -> &str;

    /// Get the backend type name (for logging/debugging).
    fn backend_name(&self) -> &'static str;
}

/// Create an archive store from configuration.
pub async fn create_archive_store(config: &StorageConfig) -> StorageResult<Arc<dyn ArchiveStore>> {
    match config.backend {
        #[cfg(feature = "gcs-storage")]
        StorageBackend::Gcs => {
            let gcs_config = config.gcs.clone().ok_or_else(|| {
                StorageError::Config("GCS backend requires [storage.gcs] config".to_string())
            })?;
            info!(bucket = %gcs_config.bucket, "Using GCS archive storage backend");
            Ok(Arc::new(GcsArchiveStore::new(gcs_config)?))
        }
        #[cfg(not(feature = "gcs-storage"))]
        StorageBackend::Gcs => Err(StorageError::Config(
            "GCS storage backend requires the 'gcs-storage' feature. \
                Rebuild with: cargo build --features gcs-storage"
                .to_string(),
        )),
        #[cfg(feature = "s3-storage")]
        StorageBackend::S3 => {
            let s3_config = config.s3.clone().ok_or_else(|| {
                StorageError::Config("S3 backend requires [storage.s3] config".to_string())
            })?;
            info!(bucket = %s3_config.bucket, "Using S3 archive storage backend");
            Ok(Arc::new(S3ArchiveStore::new(s3_config).await?))
        }
        #[cfg(not(feature = "s3-storage"))]
        StorageBackend::S3 => Err(StorageError::Config(
            "S3 storage backend requires the 's3-storage' feature. \
                Rebuild with: cargo build --features s3-storage"
                .to_string(),
        )),
        StorageBackend::Filesystem => {
            let fs_config = config.filesystem.clone().ok_or_else(|| {
                StorageError::Config(
                    "Filesystem backend requires [storage.filesystem] config".to_string(),
                )
            })?;
            info!(path = %fs_config.path, "Using filesystem archive storage backend");
            Ok(Arc::new(FilesystemArchiveStore::new(fs_config)?))
        }
    }
}
