//! Blob store manager that dispatches to the configured provider.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use drivetree_core::config::storage::StorageConfig;
use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::traits::storage::{BlobReceipt, BlobStore, ByteStream};

/// Wraps the blob store selected by `storage.provider`.
#[derive(Debug, Clone)]
pub struct BlobStoreManager {
    inner: Arc<dyn BlobStore>,
}

impl BlobStoreManager {
    /// Create the configured blob store.
    pub async fn new(config: &StorageConfig) -> AppResult<Self> {
        let inner: Arc<dyn BlobStore> = match config.provider.as_str() {
            #[cfg(feature = "local")]
            "local" => {
                info!(root = %config.local.root_path, "Initializing local blob store");
                Arc::new(crate::providers::LocalBlobStore::new(&config.local.root_path).await?)
            }
            "memory" => {
                info!("Initializing in-memory blob store");
                Arc::new(crate::providers::MemoryBlobStore::new())
            }
            #[cfg(feature = "s3")]
            "s3" => Arc::new(crate::providers::S3BlobStore::connect(&config.s3).await?),
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown storage provider: '{other}'. Supported: local, memory, s3"
                )));
            }
        };
        Ok(Self { inner })
    }

    /// Wrap an existing provider (for testing).
    pub fn from_provider(provider: Arc<dyn BlobStore>) -> Self {
        Self { inner: provider }
    }
}

#[async_trait]
impl BlobStore for BlobStoreManager {
    fn provider_type(&self) -> &str {
        self.inner.provider_type()
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> AppResult<BlobReceipt> {
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> AppResult<ByteStream> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.inner.exists(key).await
    }
}
