use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::ArchiveError;
use crate::{
    db::TableCatalog,
    storage::{ArchiveStore, StoredObject},
};

/// Drops tables, but only once their archive is confirmed in the store.
pub struct RetentionEnforcer {
    catalog: Arc<dyn TableCatalog>,
    store: Arc<dyn ArchiveStore>,
}

impl RetentionEnforcer {
    pub fn new(catalog: Arc<dyn TableCatalog>, store: Arc<dyn ArchiveStore>) -> Self {
        Self { catalog, store }
    }

    /// Re-fetch `key` from the store. With `expected_size`, the remote size
    /// must match it exactly.
    #[instrument(skip(self), fields(bucket = %self.store.bucket()))]
    pub async fn verify(
        &self,
        key: &str,
        expected_size: Option<u64>,
    ) -> Result<StoredObject, ArchiveError> {
        let object = self
            .store
            .stat(key)
            .await?
            .ok_or_else(|| ArchiveError::Verification {
                key: key.to_string(),
                reason: "object not found".to_string(),
            })?;

        if let Some(expected) = expected_size
            && object.size != expected
        {
            return Err(ArchiveError::Verification {
                key: key.to_string(),
                reason: format!("remote size {} != local size {}", object.size, expected),
            });
        }

        info!(key, size = object.size, "Archive verified");
        Ok(object)
    }

    #[instrument(skip(self), fields(database = %self.catalog.database_name()))]
    pub async fn drop_table(&self, table: &str) -> Result<(), ArchiveError> {
        self.catalog.drop_table(table).await?;
        Ok(())
    }

    /// Drop `table` after confirming its archive exists. `force` skips the
    /// check.
    pub async fn drop_archived(
        &self,
        table: &str,
        force: bool,
    ) -> Result<Option<StoredObject>, ArchiveError> {
        let key = self.store.object_key(table);
        let object = if force {
            warn!(table, key, "Dropping without checking for an archive");
            None
        } else {
            Some(self.verify(&key, None).await?)
        };

        self.drop_table(table).await?;
        Ok(object)
    }
}
