//! Database access: candidate selection and table drops.
//!
//! The catalog is a trait so the pipeline can be exercised without a live
//! server; [`MySqlCatalog`] is the production implementation.

mod error;
mod mysql;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
pub use error::{DbError, DbResult};
pub use mysql::MySqlCatalog;

use crate::config::SelectionConfig;

#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Names of tables in the configured schema that contain the selection
    /// marker and were created before the retention cutoff.
    ///
    /// Order is whatever the server returns.
    async fn find_stale_tables(&self, selection: &SelectionConfig) -> DbResult<Vec<String>>;

    /// `DROP TABLE IF EXISTS` for a single table. Dropping a table that is
    /// already gone succeeds.
    async fn drop_table(&self, table: &str) -> DbResult<()>;

    /// Schema name, for logging.
    fn database_name(&self) -> &str;
}

/// Quote a MySQL identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> DbResult<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(DbError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("`{}`", name.replace('`', "``")))
}
