//! Archive stale MySQL tables to object storage, then drop them.
//!
//! Tables whose name contains a marker and whose creation time is older than
//! the retention window are dumped with `mysqldump`, zipped, uploaded under
//! the table's name and finally dropped. See [`pipeline::Archiver`].

pub mod config;
pub mod db;
pub mod export;
pub mod observability;
pub mod pipeline;
pub mod storage;

pub use config::ArchiverConfig;
pub use pipeline::{ArchiveError, Archiver, RunReport};
