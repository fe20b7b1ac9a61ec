//! Google Cloud Storage backend over the JSON API.
//!
//! Uploads use a single `uploadType=media` request per archive. Tokens come
//! from `google-cloud-auth` and are cached for the lifetime of the store.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use google_cloud_token::TokenSourceProvider;
use reqwest::{
    RequestBuilder, Response, StatusCode,
    header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE},
};
use serde::{Deserialize, Deserializer};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};
use url::Url;

use super::{ArchiveStore, StorageError, StorageResult, StoredObject};
use crate::config::{GcpCredentials, GcsStorageConfig};

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Google access tokens live for an hour; refresh well before that.
const TOKEN_CACHE_DURATION_SECS: u64 = 50 * 60;

struct CachedToken {
    token: String,
    expires_at: std::time::Instant,
}

/// Object resource as returned by the JSON API. Only the fields we use.
#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    bucket: String,
    #[serde(deserialize_with = "deserialize_size")]
    size: u64,
}

/// The JSON API encodes `size` as a decimal string; emulators sometimes
/// send a number.
fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Text(String),
        Number(u64),
    }

    match Size::deserialize(deserializer)? {
        Size::Text(s) => s.parse().map_err(serde::de::Error::custom),
        Size::Number(n) => Ok(n),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct GcsArchiveStore {
    config: GcsStorageConfig,
    client: reqwest::Client,
    token_cache: RwLock<Option<CachedToken>>,
}

impl GcsArchiveStore {
    pub fn new(config: GcsStorageConfig) -> StorageResult<Self> {
        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            token_cache: RwLock::new(None),
        })
    }

    fn base_url(&self, segments: &[&str]) -> StorageResult<Url> {
        let mut url = Url::parse(self.config.endpoint()).map_err(|e| {
            StorageError::Config(format!(
                "Invalid GCS endpoint '{}': {}",
                self.config.endpoint(),
                e
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                StorageError::Config(format!(
                    "GCS endpoint '{}' cannot be a base URL",
                    self.config.endpoint()
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn bucket_url(&self) -> StorageResult<Url> {
        self.base_url(&["storage", "v1", "b", &self.config.bucket])
    }

    /// Object names are a single path segment, so `/` is percent-encoded.
    fn object_url(&self, key: &str) -> StorageResult<Url> {
        self.base_url(&["storage", "v1", "b", &self.config.bucket, "o", key])
    }

    fn upload_url(&self, key: &str) -> StorageResult<Url> {
        let mut url = self.base_url(&["upload", "storage", "v1", "b", &self.config.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }

    /// Get an access token, refreshing if necessary.
    /// Returns None for anonymous access.
    async fn access_token(&self) -> StorageResult<Option<String>> {
        match &self.config.credentials {
            GcpCredentials::Anonymous => return Ok(None),
            GcpCredentials::AccessToken { token } => return Ok(Some(token.clone())),
            _ => {}
        }

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.expires_at > std::time::Instant::now()
            {
                return Ok(Some(cached.token.clone()));
            }
        }

        let token = match &self.config.credentials {
            GcpCredentials::ServiceAccount { key_path } => {
                self.token_from_service_account_file(Path::new(key_path))
                    .await?
            }
            GcpCredentials::ServiceAccountJson { json } => {
                self.token_from_service_account_json(json).await?
            }
            _ => self.token_from_default_credentials().await?,
        };

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            token: token.clone(),
            expires_at: std::time::Instant::now()
                + Duration::from_secs(TOKEN_CACHE_DURATION_SECS),
        });

        Ok(Some(token))
    }

    async fn token_from_default_credentials(&self) -> StorageResult<String> {
        let config = google_cloud_auth::project::Config::default().with_scopes(&[STORAGE_SCOPE]);

        let ts = google_cloud_auth::token::DefaultTokenSourceProvider::new(config)
            .await
            .map_err(|e| StorageError::Auth(format!("Failed to create token source: {}", e)))?;

        ts.token_source()
            .token()
            .await
            .map_err(|e| StorageError::Auth(format!("Failed to get token: {}", e)))
    }

    async fn token_from_service_account_file(&self, key_path: &Path) -> StorageResult<String> {
        let key_json = tokio::fs::read_to_string(key_path).await.map_err(|e| {
            StorageError::Auth(format!(
                "Failed to read service account key file '{}': {}",
                key_path.display(),
                e
            ))
        })?;

        self.token_from_service_account_json(&key_json).await
    }

    async fn token_from_service_account_json(&self, json: &str) -> StorageResult<String> {
        use google_cloud_auth::credentials::CredentialsFile;

        let creds: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            StorageError::Auth(format!("Failed to parse service account JSON: {}", e))
        })?;

        let config = google_cloud_auth::project::Config::default().with_scopes(&[STORAGE_SCOPE]);

        let ts = google_cloud_auth::token::DefaultTokenSourceProvider::new_with_credentials(
            config,
            Box::new(creds),
        )
        .await
        .map_err(|e| {
            StorageError::Auth(format!(
                "Failed to create token source from service account: {}",
                e
            ))
        })?;

        ts.token_source()
            .token()
            .await
            .map_err(|e| StorageError::Auth(format!("Failed to get token: {}", e)))
    }

    async fn authorize(&self, req: RequestBuilder) -> StorageResult<RequestBuilder> {
        Ok(match self.access_token().await? {
            Some(token) => req.header(AUTHORIZATION, bearer(&token)),
            None => req,
        })
    }

    async fn send(&self, req: RequestBuilder) -> StorageResult<Response> {
        self.authorize(req)
            .await?
            .send()
            .await
            .map_err(|e| StorageError::Gcs(format!("Request failed: {}", e)))
    }
}

/// Token sources may already include the scheme.
fn bearer(token: &str) -> String {
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    format!("Bearer {}", token)
}

async fn error_from_response(response: Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StorageError::Auth(format!("{}: {}", status, message))
        }
        _ => StorageError::Gcs(format!("{}: {}", status, message)),
    }
}

async fn parse_object(response: Response) -> StorageResult<StoredObject> {
    let object: ObjectResource = response
        .json()
        .await
        .map_err(|e| StorageError::Gcs(format!("Invalid object metadata: {}", e)))?;

    Ok(StoredObject {
        bucket: object.bucket,
        key: object.name,
        size: object.size,
    })
}

#[async_trait]
impl ArchiveStore for GcsArchiveStore {
    fn object_key(&self, table: &str) -> String {
        self.config.object_key(table)
    }

    #[instrument(skip(self, path), fields(bucket = %self.config.bucket))]
    async fn upload(&self, key: &str, path: &Path) -> StorageResult<StoredObject> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        debug!(key, size, source = %path.display(), "Uploading archive to GCS");

        let req = self
            .client
            .post(self.upload_url(key)?)
            .header(CONTENT_TYPE, "application/zip")
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::from(file));

        let response = self.send(req).await?;
        if !response.status().is_success() {
            let err = error_from_response(response).await;
            error!(key, error = %err, "Failed to upload to GCS");
            return Err(err);
        }

        let object = parse_object(response).await?;
        info!(key, size = object.size, bucket = %object.bucket, "Archive stored in GCS");
        Ok(object)
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn stat(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let response = self.send(self.client.get(self.object_url(key)?)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => parse_object(response).await.map(Some),
            _ => Err(error_from_response(response).await),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn check_bucket(&self) -> StorageResult<()> {
        let response = self.send(self.client.get(self.bucket_url()?)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(self.config.bucket.clone())),
            status if status.is_success() => {
                debug!("Bucket is reachable");
                Ok(())
            }
            _ => Err(error_from_response(response).await),
        }
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn backend_name(&self) -> &'static str {
        "gcs"
    }
}
