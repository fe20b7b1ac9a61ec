//! Table selection and pipeline behavior configuration.
//!
//! # Example
//!
//! ```toml
//! [selection]
//! pattern = "_4475_"
//! retention_days = 28
//!
//! [pipeline]
//! failure_policy = "halt"
//! verify_upload = true
//! cleanup_local = true
//! dry_run = false
//! ```

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Which tables are candidates for archival.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    /// Substring every candidate table name must contain.
    /// Matched literally; `%` and `_` are not wildcards.
    /// Default: "_4475_"
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Tables created more than this many days before today are candidates.
    /// Default: 28 (four weeks)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_pattern() -> String {
    "_4475_".to_string()
}

fn default_retention_days() -> u32 {
    28
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.pattern.is_empty() {
            return Err("selection.pattern cannot be empty".to_string());
        }
        if self.retention_days == 0 {
            return Err("selection.retention_days must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn window(&self) -> RetentionWindow {
        RetentionWindow::days(self.retention_days)
    }

    /// Whether `table` carries the naming marker.
    pub fn matches(&self, table: &str) -> bool {
        table.contains(&self.pattern)
    }

    /// The marker as a MySQL `LIKE` pattern (`%marker%`) with wildcards
    /// and the escape character escaped.
    pub fn like_pattern(&self) -> String {
        let mut escaped = String::with_capacity(self.pattern.len() + 4);
        escaped.push('%');
        for c in self.pattern.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }
}

/// Age threshold past which a table is archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    days: u32,
}

impl RetentionWindow {
    pub fn days(days: u32) -> Self {
        Self { days }
    }

    pub fn weeks(weeks: u32) -> Self {
        Self { days: weeks * 7 }
    }

    pub fn as_days(&self) -> u32 {
        self.days
    }

    /// Midnight of `now`'s date minus the window. Tables created strictly
    /// before this instant are stale.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN);
        midnight.and_utc() - Duration::days(self.days as i64)
    }

    pub fn cutoff_date(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(self.days as i64)
    }

    pub fn is_stale(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at < self.cutoff(now)
    }
}

/// What to do when one table fails somewhere between dump and drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the batch at the first failing table.
    #[default]
    Halt,
    /// Record the failure and continue with the next candidate.
    Skip,
}

/// Pipeline behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Default: halt
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Re-read the remote object's metadata and compare its size with the
    /// local archive before dropping the table.
    /// Default: true
    #[serde(default = "default_true")]
    pub verify_upload: bool,

    /// Delete the local archive after a successful upload.
    /// The intermediate `.sql` dump is always removed.
    /// Default: true
    #[serde(default = "default_true")]
    pub cleanup_local: bool,

    /// Select and log candidates without exporting, uploading or dropping.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            verify_upload: true,
            cleanup_local: true,
            dry_run: false,
        }
    }
}

fn default_true() -> bool {
    true
}
