//! Node creation: file upload and folder creation.

use tracing::{debug, info, warn};
use uuid::Uuid;

use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::types::id::{NodeId, UserId};
use drivetree_entity::node::{NewNode, Node};

use super::service::{Intent, TreeService, ensure_unique, finish, require_folder, settle};
use crate::dto::UploadRequest;
use crate::validation::{validate_name, validate_node_id, validate_user};

impl TreeService {
    /// Store a file's content, then record it under `parent_id`.
    ///
    /// The blob is written before any lock is taken. If recording fails
    /// afterwards the blob is left behind and logged.
    pub async fn upload(&self, request: UploadRequest, user: UserId) -> AppResult<Node> {
        validate_user(user)?;
        let name = validate_name(&request.name)?;
        if let Some(parent) = request.parent_id {
            validate_node_id(parent)?;
        }
        let size = request.data.len() as u64;
        if size == 0 {
            return Err(AppError::validation("Upload content is empty"));
        }
        if size > self.max_upload_size_bytes {
            return Err(AppError::validation(format!(
                "File exceeds maximum upload size of {} bytes",
                self.max_upload_size_bytes
            )));
        }

        let id = NodeId::new();
        let storage_key = Uuid::new_v4().simple().to_string();
        let receipt = self
            .blobs
            .put(&storage_key, request.data, request.content_type.as_deref())
            .await?;
        debug!(node_id = %id, storage_key = %storage_key, bytes = receipt.size_bytes, "Blob stored");

        let new_node = NewNode::file(
            id,
            name,
            request.parent_id,
            storage_key.clone(),
            receipt.size_bytes as i64,
            user,
        )
        .with_content_type(receipt.content_type);

        match self.create(new_node).await {
            Ok(node) => {
                info!(
                    user_id = %user,
                    node_id = %node.id,
                    parent_id = ?node.parent_id,
                    name = %node.name,
                    size = node.size_bytes,
                    "Upload completed"
                );
                Ok(node)
            }
            Err(e) => {
                warn!(
                    node_id = %id,
                    storage_key = %storage_key,
                    error = %e,
                    "Upload failed after its blob was stored; blob left orphaned"
                );
                Err(e)
            }
        }
    }

    /// Create an empty folder under `parent_id`.
    pub async fn create_folder(
        &self,
        parent_id: Option<NodeId>,
        name: &str,
        user: UserId,
    ) -> AppResult<Node> {
        validate_user(user)?;
        let name = validate_name(name)?;
        if let Some(parent) = parent_id {
            validate_node_id(parent)?;
        }

        let node = self.create(NewNode::folder(name, parent_id, user)).await?;
        info!(
            user_id = %user,
            node_id = %node.id,
            parent_id = ?node.parent_id,
            name = %node.name,
            "Folder created"
        );
        Ok(node)
    }

    /// Lock the parent's namespace and insert `new_node`.
    async fn create(&self, new_node: NewNode) -> AppResult<Node> {
        let parent = new_node.parent_id;
        let lock = self.lock(Intent::Insert { parent }).await?;

        let result: AppResult<Node> = async {
            let mut tx = self.store.begin().await?;
            let outcome: AppResult<Node> = async {
                require_folder(tx.as_mut(), parent).await?;
                ensure_unique(tx.as_mut(), parent, &new_node.name, None).await?;
                let node = new_node.into_node();
                tx.insert(&node).await?;
                Ok(node)
            }
            .await;
            settle(tx, outcome).await
        }
        .await;

        finish(lock, result).await
    }
}
