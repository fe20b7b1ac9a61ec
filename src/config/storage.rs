//! Archive storage configuration.
//!
//! Supports multiple backends for the uploaded archives:
//! - **GCS**: Google Cloud Storage (default)
//! - **S3**: S3-compatible object storage (requires the `s3-storage` feature)
//! - **Filesystem**: a local directory, useful for testing and air-gapped hosts
//!
//! # Example Configuration
//!
//! ```toml
//! [storage]
//! backend = "gcs"
//!
//! [storage.gcs]
//! bucket = "table-archives"
//! credentials = { type = "service_account", key_path = "/etc/archiver/sa.json" }
//!
//! [storage.filesystem]
//! path = "/var/lib/table-archiver"
//! ```

use serde::{Deserialize, Serialize};

/// Storage configuration for uploaded archives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Storage backend to use.
    #[serde(default)]
    pub backend: StorageBackend,

    /// GCS configuration (required when backend = "gcs").
    #[serde(default)]
    pub gcs: Option<GcsStorageConfig>,

    /// S3 configuration (required when backend = "s3").
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,

    /// Filesystem configuration (required when backend = "filesystem").
    #[serde(default)]
    pub filesystem: Option<FilesystemStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gcs,
            gcs: Some(GcsStorageConfig::default()),
            s3: None,
            filesystem: None,
        }
    }
}

impl StorageConfig {
    /// Validate the storage configuration.
    pub fn validate(&self) -> Result<(), String> {
        match self.backend {
            StorageBackend::Gcs => match &self.gcs {
                Some(gcs) => gcs.validate(),
                None => Err("GCS storage backend requires [storage.gcs] configuration".to_string()),
            },
            StorageBackend::S3 => match &self.s3 {
                Some(s3) => s3.validate(),
                None => Err("S3 storage backend requires [storage.s3] configuration".to_string()),
            },
            StorageBackend::Filesystem => match &self.filesystem {
                Some(fs) => fs.validate(),
                None => Err(
                    "Filesystem storage backend requires [storage.filesystem] configuration"
                        .to_string(),
                ),
            },
        }
    }

    /// Name of the bucket (or directory) archives land in, for logging.
    pub fn destination(&self) -> String {
        match self.backend {
            StorageBackend::Gcs => self.gcs.as_ref().map(|c| c.bucket.clone()),
            StorageBackend::S3 => self.s3.as_ref().map(|c| c.bucket.clone()),
            StorageBackend::Filesystem => self.filesystem.as_ref().map(|c| c.path.clone()),
        }
        .unwrap_or_default()
    }
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Google Cloud Storage.
    #[default]
    Gcs,

    /// S3-compatible object storage.
    /// Supports AWS S3, MinIO, R2, DigitalOcean Spaces, etc.
    S3,

    /// A directory on the local filesystem.
    Filesystem,
}

/// Build the object key for a table, honoring an optional prefix.
pub(crate) fn object_key(prefix: Option<&str>, table: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.trim_end_matches('/').is_empty() => {
            format!("{}/{}", prefix.trim_end_matches('/'), table)
        }
        _ => table.to_string(),
    }
}

/// Google Cloud Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GcsStorageConfig {
    /// Bucket name.
    #[serde(default = "default_gcs_bucket")]
    pub bucket: String,

    /// How to authenticate against GCS.
    #[serde(default = "default_gcs_credentials")]
    pub credentials: GcpCredentials,

    /// Key prefix for uploaded archives.
    /// Example: "archives/" stores `tmp_4475_x` as "archives/tmp_4475_x".
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Override the API endpoint (e.g. a fake-gcs-server emulator).
    /// Default: https://storage.googleapis.com
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds. 0 disables the timeout.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for GcsStorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_gcs_bucket(),
            credentials: default_gcs_credentials(),
            key_prefix: None,
            endpoint: None,
            timeout_secs: 0,
        }
    }
}

fn default_gcs_bucket() -> String {
    "google-cloud-bucket-name".to_string()
}

fn default_gcs_credentials() -> GcpCredentials {
    GcpCredentials::ServiceAccount {
        key_path: "./service-account-json-key-path".to_string(),
    }
}

impl GcsStorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("GCS bucket name cannot be empty".to_string());
        }
        if let GcpCredentials::ServiceAccount { key_path } = &self.credentials
            && key_path.is_empty()
        {
            return Err("GCS service account key_path cannot be empty".to_string());
        }
        Ok(())
    }

    /// Generate the object key for a table.
    pub fn object_key(&self, table: &str) -> String {
        object_key(self.key_prefix.as_deref(), table)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or("https://storage.googleapis.com")
            .trim_end_matches('/')
    }
}

/// GCP credential configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum GcpCredentials {
    /// Use Application Default Credentials.
    #[default]
    Default,

    /// Use a service account key file.
    ServiceAccount { key_path: String },

    /// Use a service account key from JSON string (useful with env vars).
    ServiceAccountJson { json: String },

    /// A pre-issued OAuth access token, e.g. from `gcloud auth print-access-token`.
    AccessToken { token: String },

    /// Send no credentials. Only meaningful against an emulator.
    Anonymous,
}

impl std::fmt::Debug for GcpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::ServiceAccount { key_path } => f
                .debug_struct("ServiceAccount")
                .field("key_path", key_path)
                .finish(),
            Self::ServiceAccountJson { .. } => f
                .debug_struct("ServiceAccountJson")
                .field("json", &"****")
                .finish(),
            Self::AccessToken { .. } => f
                .debug_struct("AccessToken")
                .field("token", &"****")
                .finish(),
            Self::Anonymous => write!(f, "Anonymous"),
        }
    }
}

/// S3-compatible object storage configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3StorageConfig {
    /// S3 bucket name.
    pub bucket: String,

    /// AWS region (e.g., "us-east-1").
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    /// Examples:
    /// - MinIO: "http://localhost:9000"
    /// - R2: "https://<account-id>.r2.cloudflarestorage.com"
    #[serde(default)]
    pub endpoint: Option<String>,

    /// AWS access key ID.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// AWS secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Use path-style URLs instead of virtual-hosted style.
    /// Required for MinIO and some S3-compatible services.
    #[serde(default)]
    pub force_path_style: bool,

    /// Key prefix for uploaded archives.
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Storage class for new objects (e.g. STANDARD_IA, GLACIER).
    #[serde(default)]
    pub storage_class: Option<String>,
}

impl std::fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "****"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "****"),
            )
            .field("force_path_style", &self.force_path_style)
            .field("key_prefix", &self.key_prefix)
            .field("storage_class", &self.storage_class)
            .finish()
    }
}

impl S3StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("S3 bucket name cannot be empty".to_string());
        }
        // Region is required unless using a custom endpoint
        if self.region.is_none() && self.endpoint.is_none() {
            return Err("S3 requires either 'region' or 'endpoint' to be specified".to_string());
        }
        Ok(())
    }

    pub fn object_key(&self, table: &str) -> String {
        object_key(self.key_prefix.as_deref(), table)
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemStorageConfig {
    /// Directory archives are copied into, as `{path}/{key}`.
    pub path: String,

    /// Create the directory if it doesn't exist.
    /// Default: true
    #[serde(default = "default_true")]
    pub create_dir: bool,
}

impl FilesystemStorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("Filesystem storage path cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn object_path(&self, key: &str) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.path).join(key)
    }
}

fn default_true() -> bool {
    true
}
