//! Blob store trait for pluggable file content backends.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::result::AppResult;

/// Confirmation returned by a successful [`BlobStore::put`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlobReceipt {
    /// Key the content was stored under.
    pub key: String,
    /// Number of bytes written.
    pub size_bytes: u64,
    /// MIME type recorded with the blob, if any.
    pub content_type: Option<String>,
}

/// A byte stream type used for reading blob contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Trait for blob storage backends.
///
/// Keys are opaque strings chosen by the caller. Implementations exist for
/// the local filesystem, memory, and S3-compatible object storage.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local", "s3").
    fn provider_type(&self) -> &str;

    /// Check whether the provider is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Store `data` under `key`, replacing any previous content.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> AppResult<BlobReceipt>;

    /// Open the content stored under `key`.
    /// Fails with `NotFound` if the key does not exist.
    async fn get(&self, key: &str) -> AppResult<ByteStream>;

    /// Delete the content stored under `key`. A missing key is success.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Check whether content exists under `key`.
    async fn exists(&self, key: &str) -> AppResult<bool>;
}
