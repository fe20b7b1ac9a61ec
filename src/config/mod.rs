//! Configuration for the table archiver.
//!
//! The archiver is configured once at start-up, either from a TOML file with
//! `${VAR_NAME}` environment interpolation or, without a file, from the
//! `DB_*` environment variables plus built-in defaults.
//!
//! # Example
//!
//! ```toml
//! [database]
//! host = "${DB_HOST}"
//! username = "${DB_USERNAME}"
//! password = "${DB_PASSWORD}"
//! database = "${DB_DATABASE}"
//!
//! [selection]
//! pattern = "_4475_"
//! retention_days = 28
//!
//! [storage.gcs]
//! bucket = "table-archives"
//! ```

mod database;
mod export;
mod observability;
mod retention;
mod storage;

use std::path::Path;

pub use database::*;
pub use export::*;
pub use observability::*;
pub use retention::*;
use serde::{Deserialize, Serialize};
pub use storage::*;

/// Root configuration for the archiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiverConfig {
    /// Database holding the tables to archive.
    pub database: DatabaseConfig,

    /// Which tables are candidates.
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Dump utility settings.
    #[serde(default)]
    pub export: ExportConfig,

    /// Where archives are uploaded.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Failure policy, verification and cleanup.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ArchiverConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: ArchiverConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the default configuration with database settings taken from
    /// `DB_HOST`, `DB_USERNAME`, `DB_PASSWORD`, `DB_DATABASE` and `DB_PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            database: DatabaseConfig::from_env()?,
            selection: SelectionConfig::default(),
            export: ExportConfig::default(),
            storage: StorageConfig::default(),
            pipeline: PipelineConfig::default(),
            observability: ObservabilityConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.selection.validate().map_err(ConfigError::Validation)?;
        self.export.validate().map_err(ConfigError::Validation)?;
        self.storage.validate().map_err(ConfigError::Validation)?;

        #[cfg(not(feature = "gcs-storage"))]
        if self.storage.backend == StorageBackend::Gcs {
            return Err(ConfigError::Validation(
                "storage backend 'gcs' requires the 'gcs-storage' feature. \
                 Rebuild with: cargo build --features gcs-storage"
                    .into(),
            ));
        }
        #[cfg(not(feature = "s3-storage"))]
        if self.storage.backend == StorageBackend::S3 {
            return Err(ConfigError::Validation(
                "storage backend 's3' requires the 's3-storage' feature. \
                 Rebuild with: cargo build --features s3-storage"
                    .into(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR_NAME}` references, leaving anything after a `#` alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

/// Commented configuration written by `table-archiver init`.
pub fn default_config_toml() -> &'static str {
    r#"# table-archiver configuration
#
# Values of the form ${VAR} are read from the environment at start-up.

[database]
host = "${DB_HOST}"
username = "${DB_USERNAME}"
password = "${DB_PASSWORD}"
database = "${DB_DATABASE}"
# port = 3306

[selection]
# Only tables whose name contains this marker are archived.
pattern = "_4475_"
# Tables created more than this many days ago are archived.
retention_days = 28

[export]
dump_binary = "/usr/bin/mysqldump"
work_dir = "."

[storage]
backend = "gcs"

[storage.gcs]
bucket = "google-cloud-bucket-name"
credentials = { type = "service_account", key_path = "./service-account-json-key-path" }

[pipeline]
# "halt" stops at the first failing table, "skip" moves on to the next one.
failure_policy = "halt"
verify_upload = true
cleanup_local = true

[observability.logging]
level = "info"
format = "compact"
"#
}
