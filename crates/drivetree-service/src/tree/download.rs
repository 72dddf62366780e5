//! File download under a shared lock.

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::types::id::NodeId;
use drivetree_entity::node::Node;

use super::service::{Intent, TreeService, finish};
use crate::validation::validate_node_id;

impl TreeService {
    /// Stream the content of file `id` into `sink`, returning the byte count.
    ///
    /// The shared lock is held until `sink` has been flushed, so the blob
    /// cannot be deleted or the file moved while it is being read.
    pub async fn download<W>(&self, id: NodeId, sink: &mut W) -> AppResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        validate_node_id(id)?;
        downloadable(&self.get(id).await?)?;

        let lock = self.lock(Intent::Download(id)).await?;
        let result: AppResult<u64> = async {
            let node = self.get(id).await?;
            let key = downloadable(&node)?;

            let mut stream = self.blobs.get(key).await?;
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                sink.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            sink.flush().await?;
            Ok(written)
        }
        .await;

        let written = finish(lock, result).await?;
        info!(node_id = %id, bytes = written, "Download completed");
        Ok(written)
    }
}

/// `node` must be a file with stored content; returns its storage key.
fn downloadable(node: &Node) -> AppResult<&str> {
    if node.is_folder {
        return Err(AppError::validation(format!("Node {} is a folder", node.id)));
    }
    node.storage_key
        .as_deref()
        .ok_or_else(|| AppError::not_found(format!("File {} has no stored content", node.id)))
}
