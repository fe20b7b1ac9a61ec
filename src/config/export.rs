use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Dump utility and scratch space settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Path to a `mysqldump`-compatible executable.
    /// Default: /usr/bin/mysqldump
    #[serde(default = "default_dump_binary")]
    pub dump_binary: PathBuf,

    /// Directory the `.sql` dump and `.zip` archive are written to.
    /// Default: the current directory
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Extra arguments passed to the dump utility before the connection
    /// arguments (e.g. `["--skip-lock-tables"]`).
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dump_binary: default_dump_binary(),
            work_dir: default_work_dir(),
            extra_args: Vec::new(),
        }
    }
}

fn default_dump_binary() -> PathBuf {
    PathBuf::from("/usr/bin/mysqldump")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.dump_binary.as_os_str().is_empty() {
            return Err("export.dump_binary cannot be empty".to_string());
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err("export.work_dir cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ExportConfig = toml::from_str("").unwrap();
        assert_eq!(config.dump_binary, PathBuf::from("/usr/bin/mysqldump"));
        assert_eq!(config.work_dir, PathBuf::from("."));
        assert!(config.extra_args.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse() {
        let config: ExportConfig = toml::from_str(
            r#"
            dump_binary = "/opt/mysql/bin/mysqldump"
            work_dir = "/tmp/archiver"
            extra_args = ["--skip-lock-tables", "--hex-blob"]
            "#,
        )
        .unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/tmp/archiver"));
        assert_eq!(config.extra_args.len(), 2);
    }
}
