use std::fmt;

use crate::storage::StoredObject;

/// Pipeline stage a per-table failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Export,
    Upload,
    Verify,
    Drop,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Export => "export",
            Stage::Upload => "upload",
            Stage::Verify => "verify",
            Stage::Drop => "drop",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedTable {
    pub table: String,
    pub object: StoredObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFailure {
    pub table: String,
    pub stage: Stage,
    pub error: String,
}

/// Results from a single archival run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Every table selection returned, in processing order.
    pub candidates: Vec<String>,
    /// Tables uploaded and dropped.
    pub archived: Vec<ArchivedTable>,
    /// Candidates skipped without processing (empty names).
    pub skipped: Vec<String>,
    pub failures: Vec<TableFailure>,
    /// The failure policy stopped the batch before every candidate was seen.
    pub halted: bool,
    pub dry_run: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn archived_tables(&self) -> Vec<&str> {
        self.archived.iter().map(|a| a.table.as_str()).collect()
    }

    /// Total bytes uploaded across archived tables.
    pub fn bytes_uploaded(&self) -> u64 {
        self.archived.iter().map(|a| a.object.size).sum()
    }
}
