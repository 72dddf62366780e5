//! Local filesystem blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use drivetree_core::error::{AppError, ErrorKind};
use drivetree_core::result::AppResult;
use drivetree_core::traits::storage::{BlobReceipt, BlobStore, ByteStream};

/// Blob store keeping one file per key under a root directory.
///
/// Keys are sharded by their first two characters to keep directories
/// small. Content type is not persisted.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a blob store rooted at `root_path`, creating it if needed.
    pub async fn new(root_path: impl AsRef<Path>) -> AppResult<Self> {
        let root = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create blob root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Map a key to its file, rejecting keys that could escape the root.
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::validation(format!("Invalid blob key: {key:?}")));
        }
        let shard = key.get(..2).unwrap_or(key);
        Ok(self.root.join(shard).join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> AppResult<BlobReceipt> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create shard directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        // Write beside the target and rename so readers never see a partial blob.
        let partial = path.with_extension("part");
        let mut file = fs::File::create(&partial).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to create blob {key}"), e)
        })?;
        file.write_all(&data).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to write blob {key}"), e)
        })?;
        file.sync_all().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to flush blob {key}"), e)
        })?;
        drop(file);
        fs::rename(&partial, &path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to commit blob {key}"), e)
        })?;

        debug!(key, bytes = data.len(), "Stored blob");
        Ok(BlobReceipt {
            key: key.to_string(),
            size_bytes: data.len() as u64,
            content_type: content_type.map(str::to_string),
        })
    }

    async fn get(&self, key: &str) -> AppResult<ByteStream> {
        let path = self.resolve(key)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Blob not found: {key}"))
            } else {
                AppError::with_source(ErrorKind::Storage, format!("Failed to open blob {key}"), e)
            }
        })?;
        Ok(Box::pin(ReaderStream::new(file).map(|chunk| chunk.map(Bytes::from))))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete blob {key}"),
                e,
            )),
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        fs::try_exists(&path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to stat blob {key}"), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;

    async fn read_all(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let receipt = store
            .put("abc123", Bytes::from_static(b"hello"), Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(receipt.size_bytes, 5);
        assert!(dir.path().join("ab").join("abc123").exists());
        assert_eq!(read_all(store.get("abc123").await.unwrap()).await, b"hello");

        store.delete("abc123").await.unwrap();
        assert!(!store.exists("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();
        store.delete("nothing-here").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();
        let err = store.get("nothing-here").await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();
        let err = store
            .put("../escape", Bytes::from_static(b"x"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
