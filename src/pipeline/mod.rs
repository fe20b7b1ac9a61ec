//! The archival pipeline.
//!
//! For each stale table, strictly one after another:
//! 1. Export the table to `{table}.zip`
//! 2. Upload the archive under the table's object key
//! 3. Re-fetch the object and compare sizes (when `verify_upload` is set)
//! 4. Drop the table
//!
//! A table is never dropped unless its upload returned successfully. Failures
//! are recorded per table and handled according to the configured
//! [`FailurePolicy`](crate::config::FailurePolicy).

mod archiver;
mod enforcer;
mod report;

pub use archiver::Archiver;
pub use enforcer::RetentionEnforcer;
pub use report::{ArchivedTable, RunReport, Stage, TableFailure};
use thiserror::Error;

use crate::{db::DbError, export::ExportError, storage::StorageError};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Verification of {key} failed: {reason}")]
    Verification { key: String, reason: String },
}
