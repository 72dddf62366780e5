//! In-place mutations: rename and move.

use tracing::info;

use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::types::id::{NodeId, UserId};
use drivetree_entity::node::Node;

use super::service::{
    Intent, TreeService, ensure_unique, finish, is_self_or_ancestor_in, require, require_folder, settle,
};
use crate::validation::{validate_name, validate_node_id, validate_user};

impl TreeService {
    /// Give `id` a new name within its current folder.
    pub async fn rename(&self, id: NodeId, new_name: &str, user: UserId) -> AppResult<Node> {
        validate_user(user)?;
        validate_node_id(id)?;
        let name = validate_name(new_name)?;

        // Reject a no-op before touching any lock.
        let current = self.get(id).await?;
        if current.name == name {
            return Err(AppError::conflict(format!("Node is already named '{name}'")));
        }

        let lock = self.lock(Intent::Rename(id)).await?;
        let result: AppResult<Node> = async {
            let mut tx = self.store.begin().await?;
            let outcome: AppResult<Node> = async {
                let mut node = require(tx.as_mut(), id).await?;
                if node.name == name {
                    return Err(AppError::conflict(format!("Node is already named '{name}'")));
                }
                ensure_unique(tx.as_mut(), node.parent_id, &name, Some(id)).await?;
                node.name = name.clone();
                node.touch(user);
                tx.update(&node).await?;
                Ok(node)
            }
            .await;
            settle(tx, outcome).await
        }
        .await;

        let node = finish(lock, result).await?;
        info!(
            user_id = %user,
            node_id = %node.id,
            old_name = %current.name,
            new_name = %node.name,
            "Node renamed"
        );
        Ok(node)
    }

    /// Reparent `id` under `new_parent_id`, or to the root level for `None`.
    pub async fn move_node(
        &self,
        id: NodeId,
        new_parent_id: Option<NodeId>,
        user: UserId,
    ) -> AppResult<Node> {
        validate_user(user)?;
        validate_node_id(id)?;
        if let Some(dest) = new_parent_id {
            validate_node_id(dest)?;
        }
        if new_parent_id == Some(id) {
            return Err(AppError::conflict("Cannot move a node into itself"));
        }

        let current = self.get(id).await?;
        if current.parent_id == new_parent_id {
            return Err(AppError::conflict("Node is already in the destination folder"));
        }

        let lock = self
            .lock(Intent::Move {
                id,
                dest: new_parent_id,
            })
            .await?;
        let result: AppResult<Node> = async {
            let mut tx = self.store.begin().await?;
            let outcome: AppResult<Node> = async {
                let mut node = require(tx.as_mut(), id).await?;
                if node.parent_id == new_parent_id {
                    return Err(AppError::conflict("Node is already in the destination folder"));
                }
                require_folder(tx.as_mut(), new_parent_id).await?;
                if let Some(dest) = new_parent_id {
                    if is_self_or_ancestor_in(tx.as_mut(), id, dest).await? {
                        return Err(AppError::conflict(
                            "Cannot move a folder into its own subtree",
                        ));
                    }
                }
                ensure_unique(tx.as_mut(), new_parent_id, &node.name, Some(id)).await?;
                node.parent_id = new_parent_id;
                node.touch(user);
                tx.update(&node).await?;
                Ok(node)
            }
            .await;
            settle(tx, outcome).await
        }
        .await;

        let node = finish(lock, result).await?;
        info!(
            user_id = %user,
            node_id = %node.id,
            from = ?current.parent_id,
            to = ?node.parent_id,
            "Node moved"
        );
        Ok(node)
    }
}
