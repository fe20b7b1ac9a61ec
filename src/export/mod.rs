//! Table export: run the dump utility for one table and compress its output.
//!
//! For a table `t` the exporter writes `{work_dir}/t.sql` from the dump
//! utility's stdout, packs it into `{work_dir}/t.zip` as the single entry
//! `t.sql`, and removes the `.sql` file. The archive is handed back as an
//! [`ExportArtifact`] that deletes it on drop unless kept.

mod archive;
#[cfg(all(test, unix))]
pub(crate) mod testing;

use std::{
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use tempfile::TempPath;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, instrument};

use crate::config::{DatabaseConfig, ExportConfig};

/// Flags passed to every dump invocation.
const DUMP_FLAGS: [&str; 3] = [
    "--no-tablespaces",
    "--single-transaction",
    "--column-statistics=0",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid table name for export: {0:?}")]
    InvalidTableName(String),

    #[error("Export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start dump utility {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dump of table {table} failed ({status}): {stderr}")]
    DumpFailed {
        table: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// A table's archive on local disk.
///
/// The file is removed when the artifact is dropped unless [`keep`] is called.
///
/// [`keep`]: ExportArtifact::keep
#[derive(Debug)]
pub struct ExportArtifact {
    table: String,
    archive: TempPath,
    size: u64,
}

impl ExportArtifact {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn path(&self) -> &Path {
        &self.archive
    }

    /// Archive size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Leave the archive on disk and return its path.
    pub fn keep(self) -> ExportResult<PathBuf> {
        self.archive.keep().map_err(|e| ExportError::Io(e.error))
    }

    /// Delete the archive now, reporting any error.
    pub fn remove(self) -> ExportResult<()> {
        self.archive.close()?;
        Ok(())
    }
}

/// Runs the dump utility against the configured database.
pub struct Exporter {
    config: ExportConfig,
    database: DatabaseConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig, database: DatabaseConfig) -> Self {
        Self { config, database }
    }

    pub fn dump_path(&self, table: &str) -> PathBuf {
        self.config.work_dir.join(format!("{}.sql", table))
    }

    pub fn archive_path(&self, table: &str) -> PathBuf {
        self.config.work_dir.join(format!("{}.zip", table))
    }

    fn dump_command(&self, table: &str) -> Command {
        let mut cmd = Command::new(&self.config.dump_binary);
        cmd.args(&self.config.extra_args)
            .args(DUMP_FLAGS)
            .arg("-h")
            .arg(&self.database.host)
            .arg("-P")
            .arg(self.database.port.to_string())
            .arg("-u")
            .arg(&self.database.username)
            .arg(&self.database.database)
            .arg(table)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Keep the password out of the process list
        if self.database.password.is_empty() {
            cmd.env_remove("MYSQL_PWD");
        } else {
            cmd.env("MYSQL_PWD", &self.database.password);
        }
        cmd
    }

    /// Dump `table` and compress it into `{work_dir}/{table}.zip`.
    ///
    /// The intermediate `.sql` file is removed whether or not the export
    /// succeeds.
    #[instrument(skip(self), fields(work_dir = %self.config.work_dir.display()))]
    pub async fn export(&self, table: &str) -> ExportResult<ExportArtifact> {
        validate_table_name(table)?;
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let dump_path = self.dump_path(table);
        let archive_path = self.archive_path(table);

        let dump_file = tokio::fs::File::create(&dump_path).await?.into_std().await;
        let dump_guard = TempPath::from_path(&dump_path);

        debug!(table, binary = %self.config.dump_binary.display(), "Running dump utility");
        let child = self
            .dump_command(table)
            .stdout(Stdio::from(dump_file))
            .spawn()
            .map_err(|source| ExportError::Spawn {
                binary: self.config.dump_binary.clone(),
                source,
            })?;

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(table, status = %output.status, stderr = %stderr, "Dump failed");
            return Err(ExportError::DumpFailed {
                table: table.to_string(),
                status: output.status,
                stderr,
            });
        }

        let dump_size = tokio::fs::metadata(&dump_path).await?.len();
        info!(table, size = dump_size, path = %dump_path.display(), "Table dumped");

        let archive_guard = TempPath::from_path(&archive_path);
        let entry_name = format!("{}.sql", table);
        let (source, target) = (dump_path.clone(), archive_path.clone());
        let size = tokio::task::spawn_blocking(move || {
            archive::write_archive(&source, &target, &entry_name)
        })
        .await
        .map_err(std::io::Error::other)??;

        dump_guard.close()?;

        info!(table, size, path = %archive_path.display(), "Archive written");
        Ok(ExportArtifact {
            table: table.to_string(),
            archive: archive_guard,
            size,
        })
    }
}

/// Table names become file names, so anything that would escape the work
/// directory is refused.
fn validate_table_name(table: &str) -> ExportResult<()> {
    let invalid = table.is_empty()
        || table == "."
        || table == ".."
        || table.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ExportError::InvalidTableName(table.to_string()));
    }
    Ok(())
}
