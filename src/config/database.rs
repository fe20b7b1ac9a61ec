use serde::{Deserialize, Serialize};

use super::ConfigError;

/// MySQL connection settings.
///
/// The archiver never pools connections: selection and every drop open a
/// fresh connection from these settings and close it when done.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database server host name or address.
    pub host: String,

    /// Database server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// User used for the metadata query, the dump and the drop.
    pub username: String,

    /// Password for `username`. Empty means no password.
    #[serde(default)]
    pub password: String,

    /// Schema that holds the tables to archive.
    pub database: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field(
                "password",
                &if self.password.is_empty() { "" } else { "****" },
            )
            .field("database", &self.database)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl DatabaseConfig {
    /// Environment variables read by [`DatabaseConfig::from_env`].
    pub const ENV_HOST: &'static str = "DB_HOST";
    pub const ENV_PORT: &'static str = "DB_PORT";
    pub const ENV_USERNAME: &'static str = "DB_USERNAME";
    pub const ENV_PASSWORD: &'static str = "DB_PASSWORD";
    pub const ENV_DATABASE: &'static str = "DB_DATABASE";

    /// Build the connection settings from `DB_HOST`, `DB_USERNAME`,
    /// `DB_PASSWORD`, `DB_DATABASE` and the optional `DB_PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var(Self::ENV_PORT) {
            Ok(raw) => raw.parse().map_err(|_| {
                ConfigError::Validation(format!("{} must be a port number, got '{raw}'", Self::ENV_PORT))
            })?,
            Err(_) => default_port(),
        };

        Ok(Self {
            host: required_env(Self::ENV_HOST)?,
            port,
            username: required_env(Self::ENV_USERNAME)?,
            password: std::env::var(Self::ENV_PASSWORD).unwrap_or_default(),
            database: required_env(Self::ENV_DATABASE)?,
            connect_timeout_secs: default_connect_timeout(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Validation(
                "database.host cannot be empty".into(),
            ));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Validation(
                "database.username cannot be empty".into(),
            ));
        }
        if self.database.is_empty() {
            return Err(ConfigError::Validation(
                "database.database cannot be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarNotFound(name.to_string()))
}

fn default_port() -> u16 {
    3306
}

fn default_connect_timeout() -> u64 {
    10
}
