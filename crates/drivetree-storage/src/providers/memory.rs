//! In-memory blob store with fault injection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};

use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::traits::storage::{BlobReceipt, BlobStore, ByteStream};

const CHUNK_SIZE: usize = 4;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: Option<String>,
}

/// Blob store holding content in a map.
///
/// Counts every delete attempt and can be told to fail writes, fail the
/// deletion of chosen keys, or stream slowly so tests can interleave
/// operations with an in-flight read.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<DashMap<String, StoredBlob>>,
    failing_deletes: Arc<DashSet<String>>,
    fail_puts: Arc<AtomicBool>,
    delete_attempts: Arc<AtomicUsize>,
    chunk_delay: Option<Duration>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream reads in small chunks with `delay` between them.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Make every subsequent `put` fail.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make deletion of `key` fail with a storage error.
    pub fn fail_delete_of(&self, key: impl Into<String>) {
        self.failing_deletes.insert(key.into());
    }

    /// Number of `delete` calls so far, failed ones included.
    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether no blob is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Whether `key` is stored.
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    /// MIME type recorded with `key`.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.get(key).and_then(|b| b.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> AppResult<BlobReceipt> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::storage(format!("Injected failure writing blob {key}")));
        }
        let size_bytes = data.len() as u64;
        self.blobs.insert(
            key.to_string(),
            StoredBlob {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(BlobReceipt {
            key: key.to_string(),
            size_bytes,
            content_type: content_type.map(str::to_string),
        })
    }

    async fn get(&self, key: &str) -> AppResult<ByteStream> {
        let blob = self
            .blobs
            .get(key)
            .map(|b| b.data.clone())
            .ok_or_else(|| AppError::not_found(format!("Blob not found: {key}")))?;

        let Some(delay) = self.chunk_delay else {
            return Ok(Box::pin(futures::stream::once(async move {
                Ok::<_, std::io::Error>(blob)
            })));
        };

        let stream = futures::stream::unfold(blob, move |mut rest| async move {
            if rest.is_empty() {
                return None;
            }
            tokio::time::sleep(delay).await;
            let chunk = rest.split_to(CHUNK_SIZE.min(rest.len()));
            Some((Ok::<_, std::io::Error>(chunk), rest))
        });
        Ok(Box::pin(stream))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.contains(key) {
            return Err(AppError::storage(format!("Injected failure deleting blob {key}")));
        }
        self.blobs.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.blobs.contains_key(key))
    }
}
