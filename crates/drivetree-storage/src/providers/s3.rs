//! S3-compatible blob store (AWS S3, MinIO). Requires the `s3` feature.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream as S3Body;
use bytes::Bytes;
use futures::stream::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use drivetree_core::config::storage::S3StorageConfig;
use drivetree_core::error::{AppError, ErrorKind};
use drivetree_core::result::AppResult;
use drivetree_core::traits::storage::{BlobReceipt, BlobStore, ByteStream};

/// Blob store writing one object per key into a bucket.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Connect using `[storage.s3]`, creating the bucket if it is missing.
    ///
    /// Static credentials are used when both keys are set; otherwise the
    /// default AWS provider chain applies.
    pub async fn connect(config: &S3StorageConfig) -> AppResult<Self> {
        info!(
            endpoint = %config.endpoint,
            region = %config.region,
            bucket = %config.bucket,
            "Initializing S3 blob store"
        );

        let region = Region::new(config.region.clone());
        let mut builder = if config.access_key.is_empty() || config.secret_key.is_empty() {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        } else {
            aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(Credentials::new(
                    config.access_key.clone(),
                    config.secret_key.clone(),
                    None,
                    None,
                    "drivetree-config",
                ))
        };
        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint).force_path_style(true);
        }

        let store = Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        };
        store.ensure_bucket().await?;
        Ok(store)
    }

    async fn ensure_bucket(&self) -> AppResult<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }
        info!(bucket = %self.bucket, "Creating missing bucket");
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create bucket {}", self.bucket),
                    e,
                )
            })?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn provider_type(&self) -> &str {
        "s3"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok())
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> AppResult<BlobReceipt> {
        let size_bytes = data.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(S3Body::from(data))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("Failed to upload blob {key}"), e)
            })?;

        debug!(key, bytes = size_bytes, "Stored blob in S3");
        Ok(BlobReceipt {
            key: key.to_string(),
            size_bytes,
            content_type: content_type.map(str::to_string),
        })
    }

    async fn get(&self, key: &str) -> AppResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    AppError::not_found(format!("Blob not found: {key}"))
                } else {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to fetch blob {key}"),
                        service,
                    )
                }
            })?;

        let reader = output.body.into_async_read();
        Ok(Box::pin(ReaderStream::new(reader).map(|chunk| chunk.map(Bytes::from))))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("Failed to delete blob {key}"), e)
            })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to stat blob {key}"),
                        service,
                    ))
                }
            }
        }
    }
}
