//! Hierarchical lock coordinator: lock sets from tree shape, all-or-nothing
//! acquisition.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use drivetree_core::config::lock::LockConfig;
use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::traits::lock::{LockMode, LockProvider};
use drivetree_core::types::id::NodeId;
use drivetree_database::store::TreeQuery;
use drivetree_lock::keys;

use super::guard::{CombinedLock, release_all};
use super::plan::LockPlan;

/// Turns node ids into lock sets and holds them as one unit.
///
/// Ancestor sets are always root-first and descendant sets are sorted by
/// id, so every plan requests shared resources in the same global order.
#[derive(Clone)]
pub struct HierarchicalLockCoordinator {
    /// Lock backend.
    locks: Arc<dyn LockProvider>,
    /// Ancestor/descendant traversal.
    tree: Arc<dyn TreeQuery>,
    /// Timeouts and lease.
    config: LockConfig,
}

impl std::fmt::Debug for HierarchicalLockCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalLockCoordinator")
            .field("provider", &self.locks.provider_type())
            .finish()
    }
}

impl HierarchicalLockCoordinator {
    /// Creates a new coordinator.
    pub fn new(locks: Arc<dyn LockProvider>, tree: Arc<dyn TreeQuery>, config: LockConfig) -> Self {
        Self {
            locks,
            tree,
            config,
        }
    }

    /// Lock keys for `node_id` and each of its ancestors, root first.
    ///
    /// Empty for `None` and for an id that no longer exists.
    pub async fn ancestor_lock_set(&self, node_id: Option<NodeId>) -> AppResult<Vec<String>> {
        let Some(id) = node_id else {
            return Ok(Vec::new());
        };
        let chain = self.tree.ancestors(id).await?;
        Ok(chain.iter().map(|n| keys::node(n.id)).collect())
    }

    /// Lock keys for `node_id` and everything beneath it, sorted by id.
    ///
    /// Empty for an id that no longer exists.
    pub async fn descendant_lock_set(&self, node_id: NodeId) -> AppResult<Vec<String>> {
        let mut ids: Vec<NodeId> = self
            .tree
            .descendants(node_id)
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(keys::node).collect())
    }

    /// Take the read side of every key in `plan`.
    pub async fn acquire_shared(&self, plan: LockPlan) -> AppResult<CombinedLock> {
        self.acquire(plan, LockMode::Shared).await
    }

    /// Take the write side of every key in `plan`.
    pub async fn acquire_exclusive(&self, plan: LockPlan) -> AppResult<CombinedLock> {
        self.acquire(plan, LockMode::Exclusive).await
    }

    /// Release a combined lock. Releasing twice is a no-op.
    pub async fn release(&self, lock: &mut CombinedLock) -> AppResult<()> {
        lock.release().await
    }

    /// Check the lock backend.
    pub async fn health_check(&self) -> AppResult<bool> {
        self.locks.health_check().await
    }

    async fn acquire(&self, plan: LockPlan, mode: LockMode) -> AppResult<CombinedLock> {
        let owner = Uuid::new_v4().to_string();
        let keys = plan.into_keys();
        let lease = self.config.lease();

        if keys.is_empty() {
            return Ok(CombinedLock::new(owner, mode, keys, self.locks.clone(), lease));
        }

        let started = Instant::now();
        let deadline = started + self.config.acquire_timeout();
        let attempt_budget = self.config.attempt_wait() * keys.len() as u32;
        let mut attempts = 0u32;

        debug!(owner = %owner, mode = %mode, locks = ?keys, "Acquiring lock plan");

        loop {
            attempts += 1;
            let attempt_deadline = Instant::now() + attempt_budget;
            let mut taken: Vec<String> = Vec::with_capacity(keys.len());

            for key in &keys {
                let wait = attempt_deadline.saturating_duration_since(Instant::now());
                match self.locks.acquire(key, mode, &owner, lease, wait).await {
                    Ok(true) => taken.push(key.clone()),
                    Ok(false) => break,
                    Err(e) => {
                        let _ = release_all(self.locks.as_ref(), &taken, mode, &owner).await;
                        return Err(e);
                    }
                }
            }

            if taken.len() == keys.len() {
                debug!(
                    owner = %owner,
                    mode = %mode,
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Lock plan acquired"
                );
                return Ok(CombinedLock::new(owner, mode, keys, self.locks.clone(), lease));
            }

            release_all(self.locks.as_ref(), &taken, mode, &owner).await?;

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    mode = %mode,
                    locks = keys.len(),
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Timed out acquiring lock plan"
                );
                return Err(AppError::lock_timeout(format!(
                    "Could not acquire {} {mode} locks within {} ms",
                    keys.len(),
                    self.config.acquire_timeout_ms
                )));
            }
            tokio::time::sleep(self.config.retry_interval().min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use drivetree_core::error::ErrorKind;
    use drivetree_database::repositories::MemoryNodeRepository;
    use drivetree_database::store::NodeStore;
    use drivetree_entity::node::NewNode;
    use drivetree_lock::memory::MemoryLockProvider;

    use super::*;

    fn quick_config() -> LockConfig {
        LockConfig {
            acquire_timeout_ms: 150,
            attempt_wait_ms: 10,
            retry_interval_ms: 5,
            ..LockConfig::default()
        }
    }

    async fn seeded() -> (Arc<MemoryNodeRepository>, NodeId, NodeId, NodeId) {
        let repo = Arc::new(MemoryNodeRepository::new());
        let user = drivetree_core::types::id::UserId::new();
        let a = NewNode::folder("a", None, user).into_node();
        let b = NewNode::folder("b", Some(a.id), user).into_node();
        let c = NewNode::folder("c", Some(b.id), user).into_node();
        let ids = (a.id, b.id, c.id);
        let mut tx = repo.begin().await.unwrap();
        for node in [a, b, c] {
            tx.insert(&node).await.unwrap();
        }
        tx.commit().await.unwrap();
        (repo, ids.0, ids.1, ids.2)
    }

    #[tokio::test]
    async fn test_ancestor_set_is_root_first() {
        let (repo, a, b, c) = seeded().await;
        let coordinator =
            HierarchicalLockCoordinator::new(Arc::new(MemoryLockProvider::new()), repo, quick_config());

        let set = coordinator.ancestor_lock_set(Some(c)).await.unwrap();
        assert_eq!(set, vec![keys::node(a), keys::node(b), keys::node(c)]);
        assert!(coordinator.ancestor_lock_set(None).await.unwrap().is_empty());
        assert!(
            coordinator
                .ancestor_lock_set(Some(NodeId::new()))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_descendant_set_is_sorted() {
        let (repo, a, b, c) = seeded().await;
        let coordinator =
            HierarchicalLockCoordinator::new(Arc::new(MemoryLockProvider::new()), repo, quick_config());

        let set = coordinator.descendant_lock_set(a).await.unwrap();
        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(set, expected.into_iter().map(keys::node).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_exclusive_blocks_until_release() {
        let (repo, a, _, _) = seeded().await;
        let locks = Arc::new(MemoryLockProvider::new());
        let coordinator = HierarchicalLockCoordinator::new(locks.clone(), repo, quick_config());

        let plan = || LockPlan::new().then([keys::node(a)]);
        let mut held = coordinator.acquire_exclusive(plan()).await.unwrap();
        assert!(locks.is_held_by(&keys::node(a), LockMode::Exclusive, held.owner()));

        let err = coordinator.acquire_shared(plan()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockTimeout);

        coordinator.release(&mut held).await.unwrap();
        coordinator.release(&mut held).await.unwrap();
        let mut shared = coordinator.acquire_shared(plan()).await.unwrap();
        shared.release().await.unwrap();
        assert_eq!(locks.held_keys(), 0);
    }

    #[tokio::test]
    async fn test_failed_attempt_holds_nothing() {
        let (repo, a, b, _) = seeded().await;
        let locks = Arc::new(MemoryLockProvider::new());
        let coordinator = HierarchicalLockCoordinator::new(locks.clone(), repo, quick_config());

        let mut blocker = coordinator
            .acquire_exclusive(LockPlan::new().then([keys::node(b)]))
            .await
            .unwrap();
        let err = coordinator
            .acquire_exclusive(LockPlan::new().then([keys::node(a), keys::node(b)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LockTimeout);
        assert_eq!(locks.held_keys(), 1);
        assert!(!locks.is_held_by(&keys::node(a), LockMode::Exclusive, blocker.owner()));
        blocker.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_plan_is_null_lock() {
        let (repo, _, _, _) = seeded().await;
        let coordinator =
            HierarchicalLockCoordinator::new(Arc::new(MemoryLockProvider::new()), repo, quick_config());
        let mut lock = coordinator.acquire_exclusive(LockPlan::new()).await.unwrap();
        assert!(lock.keys().is_empty());
        lock.release().await.unwrap();
        assert!(!lock.is_held());
    }
}
