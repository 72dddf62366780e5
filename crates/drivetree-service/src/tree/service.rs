//! Tree engine: shared state, reads, and the lock-then-transact plumbing
//! every mutation goes through.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use drivetree_core::config::AppConfig;
use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::traits::lock::{LockMode, LockProvider};
use drivetree_core::traits::storage::BlobStore;
use drivetree_core::types::id::NodeId;
use drivetree_database::store::{NodeStore, NodeTransaction, TreeBackend, TreeQuery};
use drivetree_entity::node::Node;

use crate::coordinator::{CombinedLock, HierarchicalLockCoordinator, LockPlan};
use crate::validation::validate_node_id;

/// Runs file and folder operations on the node tree.
///
/// Every mutation locks first, then opens one transaction, and releases
/// its locks only after that transaction has committed or rolled back.
#[derive(Clone)]
pub struct TreeService {
    /// Node records.
    pub(super) store: Arc<dyn NodeStore>,
    /// Ancestor/descendant traversal.
    pub(super) tree: Arc<dyn TreeQuery>,
    /// Lock planning and acquisition.
    pub(super) coordinator: HierarchicalLockCoordinator,
    /// File content.
    pub(super) blobs: Arc<dyn BlobStore>,
    /// Largest accepted upload.
    pub(super) max_upload_size_bytes: u64,
    /// Re-planning budget when a node moves before its locks are granted.
    pub(super) max_plan_attempts: u32,
}

impl std::fmt::Debug for TreeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeService")
            .field("store", &self.store.store_type())
            .field("blobs", &self.blobs.provider_type())
            .finish()
    }
}

/// Reachability of each backend the engine depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ComponentHealth {
    /// Node store.
    pub store: bool,
    /// Lock provider.
    pub locks: bool,
    /// Blob store.
    pub blobs: bool,
}

impl ComponentHealth {
    /// Whether every backend answered.
    pub fn is_healthy(&self) -> bool {
        self.store && self.locks && self.blobs
    }
}

/// What an operation is about to do, for lock planning.
#[derive(Debug, Clone, Copy)]
pub(super) enum Intent {
    /// Add a child under `parent`.
    Insert { parent: Option<NodeId> },
    /// Stream a file.
    Download(NodeId),
    /// Change a node's name.
    Rename(NodeId),
    /// Reparent a node.
    Move { id: NodeId, dest: Option<NodeId> },
    /// Remove a subtree.
    Delete(NodeId),
}

impl Intent {
    fn mode(&self) -> LockMode {
        match self {
            Self::Download(_) => LockMode::Shared,
            _ => LockMode::Exclusive,
        }
    }
}

impl TreeService {
    /// Creates a new tree service.
    pub fn new(
        backend: TreeBackend,
        locks: Arc<dyn LockProvider>,
        blobs: Arc<dyn BlobStore>,
        config: &AppConfig,
    ) -> Self {
        let coordinator =
            HierarchicalLockCoordinator::new(locks, backend.query.clone(), config.lock.clone());
        Self {
            store: backend.store,
            tree: backend.query,
            coordinator,
            blobs,
            max_upload_size_bytes: config.storage.max_upload_size_bytes,
            max_plan_attempts: config.tree.max_plan_attempts.max(1),
        }
    }

    /// The lock coordinator this engine plans with.
    pub fn coordinator(&self) -> &HierarchicalLockCoordinator {
        &self.coordinator
    }

    /// Fetch one node.
    pub async fn get(&self, id: NodeId) -> AppResult<Node> {
        validate_node_id(id)?;
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))
    }

    /// Direct children of a folder, or of the root level when `parent_id` is `None`.
    pub async fn list_children(&self, parent_id: Option<NodeId>) -> AppResult<Vec<Node>> {
        if let Some(parent) = parent_id {
            let node = self.get(parent).await?;
            if !node.is_folder {
                return Err(AppError::validation(format!("Node {parent} is not a folder")));
            }
        }
        self.store.list_children(parent_id).await
    }

    /// The chain from the root level down to `id`, inclusive.
    pub async fn path(&self, id: NodeId) -> AppResult<Vec<Node>> {
        self.get(id).await?;
        self.tree.ancestors(id).await
    }

    /// Whether `candidate` is a proper ancestor of `node_id`.
    ///
    /// A node is not its own ancestor. A broken chain answers `false`.
    pub async fn is_ancestor(&self, candidate: NodeId, node_id: NodeId) -> AppResult<bool> {
        let Some(node) = self.store.get(node_id).await? else {
            return Ok(false);
        };
        let mut seen = HashSet::from([node_id]);
        let mut cursor = node.parent_id;
        while let Some(current) = cursor {
            if current == candidate {
                return Ok(true);
            }
            if !seen.insert(current) {
                return Ok(false);
            }
            cursor = match self.store.get(current).await? {
                Some(node) => node.parent_id,
                None => return Ok(false),
            };
        }
        Ok(false)
    }

    /// Ask every backend whether it answers.
    pub async fn health_check(&self) -> ComponentHealth {
        ComponentHealth {
            store: self.store.health_check().await.unwrap_or(false),
            locks: self.coordinator.health_check().await.unwrap_or(false),
            blobs: self.blobs.health_check().await.unwrap_or(false),
        }
    }

    /// Compute the lock plan for `intent` from the tree as it is now.
    async fn plan(&self, intent: Intent) -> AppResult<LockPlan> {
        let plan = match intent {
            Intent::Insert { parent } => self.namespace_plan(parent).await?,
            Intent::Download(id) => {
                let node = self.get(id).await?;
                LockPlan::new()
                    .then(self.coordinator.ancestor_lock_set(node.parent_id).await?)
                    .then(self.coordinator.descendant_lock_set(id).await?)
            }
            Intent::Rename(id) => {
                let node = self.get(id).await?;
                self.namespace_plan(node.parent_id)
                    .await?
                    .then(self.coordinator.descendant_lock_set(id).await?)
            }
            Intent::Move { id, dest } => {
                self.get(id).await?;
                self.namespace_plan(dest)
                    .await?
                    .then(self.coordinator.descendant_lock_set(id).await?)
            }
            Intent::Delete(id) => {
                self.get(id).await?;
                LockPlan::new().then(self.coordinator.descendant_lock_set(id).await?)
            }
        };
        Ok(plan)
    }

    /// Locks guarding the set of names directly under `parent`.
    async fn namespace_plan(&self, parent: Option<NodeId>) -> AppResult<LockPlan> {
        match parent {
            None => Ok(LockPlan::new().with_root_namespace()),
            Some(id) => Ok(LockPlan::new().then(self.coordinator.ancestor_lock_set(Some(id)).await?)),
        }
    }

    /// Plan, acquire, then re-plan under the lock.
    ///
    /// If the tree changed between planning and the grant, the locks no
    /// longer match the operation; they are dropped and the plan is
    /// recomputed, up to `max_plan_attempts` times. Running out of attempts
    /// is a retryable `LockTimeout`.
    pub(super) async fn lock(&self, intent: Intent) -> AppResult<CombinedLock> {
        for attempt in 1..=self.max_plan_attempts {
            let plan = self.plan(intent).await?;
            let mut lock = match intent.mode() {
                LockMode::Shared => self.coordinator.acquire_shared(plan.clone()).await?,
                LockMode::Exclusive => self.coordinator.acquire_exclusive(plan.clone()).await?,
            };
            match self.plan(intent).await {
                Ok(current) if current == plan => return Ok(lock),
                Ok(_) => {
                    debug!(?intent, attempt, "Tree changed while locking; re-planning");
                    release(&mut lock).await;
                }
                Err(e) => {
                    release(&mut lock).await;
                    return Err(e);
                }
            }
        }
        Err(AppError::lock_timeout(format!(
            "Tree kept changing while acquiring locks ({} attempts); try again",
            self.max_plan_attempts
        )))
    }
}

/// Release `lock`, logging rather than failing; leases lapse on their own.
pub(super) async fn release(lock: &mut CombinedLock) {
    if let Err(e) = lock.release().await {
        warn!(owner = lock.owner(), error = %e, "Failed to release combined lock");
    }
}

/// Release `lock` and pass `result` through.
pub(super) async fn finish<T>(mut lock: CombinedLock, result: AppResult<T>) -> AppResult<T> {
    release(&mut lock).await;
    result
}

/// Commit on success, roll back on failure.
pub(super) async fn settle<T>(
    tx: Box<dyn NodeTransaction>,
    outcome: AppResult<T>,
) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Read `id` inside `tx`, `NotFound` if absent.
pub(super) async fn require(tx: &mut dyn NodeTransaction, id: NodeId) -> AppResult<Node> {
    tx.get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))
}

/// `parent` must be the root level or an existing folder.
pub(super) async fn require_folder(
    tx: &mut dyn NodeTransaction,
    parent: Option<NodeId>,
) -> AppResult<()> {
    let Some(id) = parent else {
        return Ok(());
    };
    let node = tx
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Folder {id} not found")))?;
    if !node.is_folder {
        return Err(AppError::validation(format!("Node {id} is not a folder")));
    }
    Ok(())
}

/// No node other than `exclude` may already use `name` under `parent`.
pub(super) async fn ensure_unique(
    tx: &mut dyn NodeTransaction,
    parent: Option<NodeId>,
    name: &str,
    exclude: Option<NodeId>,
) -> AppResult<()> {
    if tx.count_matching(parent, name, exclude).await? > 0 {
        return Err(AppError::conflict(format!(
            "A node named '{name}' already exists in this folder"
        )));
    }
    Ok(())
}

/// Whether `candidate` is `node_id` or above it, as seen by `tx`.
pub(super) async fn is_self_or_ancestor_in(
    tx: &mut dyn NodeTransaction,
    candidate: NodeId,
    node_id: NodeId,
) -> AppResult<bool> {
    let mut seen = HashSet::new();
    let mut cursor = Some(node_id);
    while let Some(current) = cursor {
        if current == candidate {
            return Ok(true);
        }
        if !seen.insert(current) {
            return Ok(false);
        }
        cursor = match tx.get(current).await? {
            Some(node) => node.parent_id,
            None => return Ok(false),
        };
    }
    Ok(false)
}
