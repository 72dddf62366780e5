//! Recursive subtree deletion.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::types::id::{NodeId, UserId};
use drivetree_database::store::NodeTransaction;
use drivetree_entity::node::Node;

use super::service::{Intent, TreeService, finish, require, settle};
use crate::validation::{validate_node_id, validate_user};

/// Outcome of deleting a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Records removed.
    pub removed: usize,
    /// Records kept because they, or a record below them, could not be removed.
    pub retained: usize,
    /// Blob deletions attempted, one per removed file.
    pub blob_attempts: usize,
    /// Blobs left behind because their deletion failed after the record was gone.
    pub orphaned_blobs: usize,
}

impl TreeService {
    /// Delete `id` and, for a folder, everything beneath it.
    ///
    /// Records go children first in one transaction. A record that cannot
    /// be removed is kept along with every folder above it, and its
    /// siblings still go. Blobs are deleted only once the removals have
    /// committed, so no surviving record ever points at deleted content.
    /// Kept records are reported as a `Database` error and blobs that
    /// could not be deleted as a `Storage` error; in both cases everything
    /// else has already been removed.
    pub async fn delete(&self, id: NodeId, user: UserId) -> AppResult<DeleteReport> {
        validate_user(user)?;
        validate_node_id(id)?;

        let lock = self.lock(Intent::Delete(id)).await?;
        let result: AppResult<DeleteReport> = async {
            let mut tx = self.store.begin().await?;
            let outcome = remove_subtree(tx.as_mut(), id).await;
            let (mut report, blobs) = settle(tx, outcome).await?;
            self.delete_blobs(&blobs, &mut report).await;
            Ok(report)
        }
        .await;
        let report = finish(lock, result).await?;

        if report.retained > 0 {
            warn!(
                user_id = %user,
                node_id = %id,
                removed = report.removed,
                retained = report.retained,
                "Delete finished with retained nodes"
            );
            return Err(AppError::database(format!(
                "Deleted {} nodes; {} kept because their records could not be removed",
                report.removed, report.retained
            )));
        }
        if report.orphaned_blobs > 0 {
            return Err(AppError::storage(format!(
                "Deleted {} nodes; {} blob(s) could not be removed and were left behind",
                report.removed, report.orphaned_blobs
            )));
        }

        info!(
            user_id = %user,
            node_id = %id,
            removed = report.removed,
            blobs = report.blob_attempts,
            "Subtree deleted"
        );
        Ok(report)
    }

    /// Delete the content of files whose records are already committed away.
    async fn delete_blobs(&self, blobs: &[(NodeId, String)], report: &mut DeleteReport) {
        for (node_id, key) in blobs {
            report.blob_attempts += 1;
            if let Err(e) = self.blobs.delete(key).await {
                warn!(
                    node_id = %node_id,
                    storage_key = %key,
                    error = %e,
                    "Blob deletion failed after its record was removed; blob left orphaned"
                );
                report.orphaned_blobs += 1;
            }
        }
    }
}

/// Remove `id` and its subtree inside `tx`, children first.
///
/// Returns the tally and the storage keys of every file record removed.
async fn remove_subtree(
    tx: &mut dyn NodeTransaction,
    id: NodeId,
) -> AppResult<(DeleteReport, Vec<(NodeId, String)>)> {
    let root = require(tx, id).await?;
    let order = collect_preorder(tx, root).await?;
    let parents: HashMap<NodeId, Option<NodeId>> =
        order.iter().map(|n| (n.id, n.parent_id)).collect();

    let mut report = DeleteReport::default();
    let mut retained: HashSet<NodeId> = HashSet::new();
    let mut blobs = Vec::new();

    // Reverse pre-order visits every child before its parent.
    for node in order.iter().rev() {
        if retained.contains(&node.id) {
            continue;
        }
        if let Err(e) = tx.remove(node.id).await {
            warn!(node_id = %node.id, error = %e, "Record removal failed; keeping node");
            retain_chain(&mut retained, &parents, node.id, id);
            continue;
        }
        report.removed += 1;
        debug!(node_id = %node.id, "Node removed");
        if let (false, Some(key)) = (node.is_folder, node.storage_key.as_deref()) {
            blobs.push((node.id, key.to_string()));
        }
    }

    report.retained = retained.len();
    Ok((report, blobs))
}

/// `root` followed by its subtree, depth-first, parents before children.
async fn collect_preorder(tx: &mut dyn NodeTransaction, root: Node) -> AppResult<Vec<Node>> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id) {
            continue;
        }
        if node.is_folder {
            let mut children = tx.children(Some(node.id)).await?;
            children.reverse();
            stack.extend(children);
        }
        order.push(node);
    }
    Ok(order)
}

/// Mark `id` and every folder above it, up to `top`, as kept.
fn retain_chain(
    retained: &mut HashSet<NodeId>,
    parents: &HashMap<NodeId, Option<NodeId>>,
    id: NodeId,
    top: NodeId,
) {
    let mut cursor = Some(id);
    while let Some(current) = cursor {
        if !retained.insert(current) || current == top {
            break;
        }
        cursor = parents.get(&current).copied().flatten();
    }
}
