use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::{
    error::SdkError, operation::head_object::HeadObjectError, primitives::ByteStream,
};
use tracing::{debug, error, info, instrument};

use super::{ArchiveStore, StorageError, StorageResult, StoredObject};
use crate::config::S3StorageConfig;

/// S3-compatible object storage backend.
///
/// Works with AWS S3, MinIO, Cloudflare R2 and other S3-compatible services.
pub struct S3ArchiveStore {
    config: S3StorageConfig,
    client: aws_sdk_s3::Client,
}

impl S3ArchiveStore {
    pub async fn new(config: S3StorageConfig) -> StorageResult<Self> {
        info!(bucket = %config.bucket, "Initializing S3 archive storage");

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(aws_config::Region::new(region.clone()));
        }

        // Static credentials from config take precedence over the default chain
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "table-archiver-config",
            );
            sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

        Ok(Self { config, client })
    }
}

#[async_trait]
impl ArchiveStore for S3ArchiveStore {
    fn object_key(&self, table: &str) -> String {
        self.config.object_key(table)
    }

    #[instrument(skip(self, path), fields(bucket = %self.config.bucket))]
    async fn upload(&self, key: &str, path: &Path) -> StorageResult<StoredObject> {
        let size = tokio::fs::metadata(path).await?.len();
        debug!(key, size, source = %path.display(), "Uploading archive to S3");

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::S3(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type("application/zip")
            .content_length(size as i64)
            .body(body);

        if let Some(storage_class) = &self.config.storage_class {
            request = request.storage_class(storage_class.as_str().into());
        }

        request.send().await.map_err(|e| {
            error!(key, error = %e, "Failed to upload to S3");
            StorageError::S3(e.to_string())
        })?;

        info!(key, size, bucket = %self.config.bucket, "Archive stored in S3");
        Ok(StoredObject {
            bucket: self.config.bucket.clone(),
            key: key.to_string(),
            size,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn stat(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        match self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(StoredObject {
                bucket: self.config.bucket.clone(),
                key: key.to_string(),
                size: output.content_length().unwrap_or_default().max(0) as u64,
            })),
            Err(SdkError::ServiceError(e)) if matches!(e.err(), HeadObjectError::NotFound(_)) => {
                Ok(None)
            }
            Err(e) => Err(StorageError::S3(e.to_string())),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn check_bucket(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NotFound") || e.to_string().contains("NoSuchBucket") {
                    StorageError::NotFound(self.config.bucket.clone())
                } else {
                    StorageError::S3(e.to_string())
                }
            })?;
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
