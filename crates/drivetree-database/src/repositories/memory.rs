//! In-process node repository.
//!
//! Committed state lives in one map. A transaction takes the single writer
//! slot, works on a private copy, and swaps it in on commit, so readers
//! never see a half-applied mutation and writers are serialized. The
//! PostgreSQL constraints (sibling-name uniqueness, parent reference,
//! no removal of a node that still has children) are enforced the same way.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::types::id::NodeId;
use drivetree_entity::node::Node;

use crate::store::{NodeStore, NodeTransaction, TreeQuery};

type NodeMap = HashMap<NodeId, Node>;

/// Map-backed node store for single-process deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeRepository {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    committed: RwLock<NodeMap>,
    writer: Arc<Mutex<()>>,
    failing: RwLock<HashSet<NodeId>>,
    failing_commits: AtomicBool,
}

impl Inner {
    fn snapshot(&self) -> AppResult<NodeMap> {
        self.committed
            .read()
            .map(|map| map.clone())
            .map_err(|_| AppError::internal("Node map lock poisoned"))
    }

    fn read<T>(&self, f: impl FnOnce(&NodeMap) -> T) -> AppResult<T> {
        self.committed
            .read()
            .map(|map| f(&map))
            .map_err(|_| AppError::internal("Node map lock poisoned"))
    }

    fn is_failing(&self, id: NodeId) -> bool {
        self.failing.read().map(|set| set.contains(&id)).unwrap_or(false)
    }
}

impl MemoryNodeRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write touching `id` fail with a `Database` error.
    pub fn fail_writes_for(&self, id: NodeId) {
        if let Ok(mut set) = self.inner.failing.write() {
            set.insert(id);
        }
    }

    /// Make every commit fail with a `Database` error, leaving state untouched.
    pub fn fail_commits(&self, fail: bool) {
        self.inner.failing_commits.store(fail, Ordering::SeqCst);
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        if let Ok(mut set) = self.inner.failing.write() {
            set.clear();
        }
        self.inner.failing_commits.store(false, Ordering::SeqCst);
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.inner.read(|map| map.len()).unwrap_or(0)
    }

    /// Whether no record is committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every committed record, in no particular order.
    pub fn all(&self) -> AppResult<Vec<Node>> {
        self.inner.read(|map| map.values().cloned().collect())
    }
}

fn children_of(map: &NodeMap, parent_id: Option<NodeId>) -> Vec<Node> {
    let mut children: Vec<Node> = map
        .values()
        .filter(|n| n.parent_id == parent_id)
        .cloned()
        .collect();
    children.sort_by(|a, b| a.name.cmp(&b.name));
    children
}

fn ancestors_of(map: &NodeMap, id: NodeId) -> Vec<Node> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = Some(id);
    while let Some(current) = cursor {
        if !seen.insert(current) {
            break;
        }
        let Some(node) = map.get(&current) else {
            break;
        };
        chain.push(node.clone());
        cursor = node.parent_id;
    }
    chain.reverse();
    chain
}

fn descendants_of(map: &NodeMap, id: NodeId) -> Vec<Node> {
    let Some(root) = map.get(&id) else {
        return Vec::new();
    };
    let mut by_parent: HashMap<NodeId, Vec<&Node>> = HashMap::new();
    for node in map.values() {
        if let Some(parent) = node.parent_id {
            by_parent.entry(parent).or_default().push(node);
        }
    }

    let mut out = vec![root.clone()];
    let mut seen = HashSet::from([id]);
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        let Some(children) = by_parent.get(&current) else {
            continue;
        };
        for child in children {
            if seen.insert(child.id) {
                out.push((*child).clone());
                queue.push_back(child.id);
            }
        }
    }
    out
}

#[async_trait]
impl TreeQuery for MemoryNodeRepository {
    async fn ancestors(&self, id: NodeId) -> AppResult<Vec<Node>> {
        self.inner.read(|map| ancestors_of(map, id))
    }

    async fn descendants(&self, id: NodeId) -> AppResult<Vec<Node>> {
        self.inner.read(|map| descendants_of(map, id))
    }
}

#[async_trait]
impl NodeStore for MemoryNodeRepository {
    fn store_type(&self) -> &str {
        "memory"
    }

    async fn get(&self, id: NodeId) -> AppResult<Option<Node>> {
        self.inner.read(|map| map.get(&id).cloned())
    }

    async fn list_children(&self, parent_id: Option<NodeId>) -> AppResult<Vec<Node>> {
        self.inner.read(|map| children_of(map, parent_id))
    }

    async fn begin(&self) -> AppResult<Box<dyn NodeTransaction>> {
        let permit = self.inner.writer.clone().lock_owned().await;
        let working = self.inner.snapshot()?;
        Ok(Box::new(MemoryNodeTransaction {
            inner: self.inner.clone(),
            working,
            _permit: permit,
        }))
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

/// A transaction over a private copy of the committed map.
pub struct MemoryNodeTransaction {
    inner: Arc<Inner>,
    working: NodeMap,
    _permit: OwnedMutexGuard<()>,
}

impl MemoryNodeTransaction {
    fn check_injected(&self, id: NodeId, action: &str) -> AppResult<()> {
        if self.inner.is_failing(id) {
            return Err(AppError::database(format!(
                "Injected failure: cannot {action} node {id}"
            )));
        }
        Ok(())
    }

    fn check_constraints(&self, node: &Node) -> AppResult<()> {
        if node.parent_id == Some(node.id) {
            return Err(AppError::database(format!(
                "Node {} cannot be its own parent",
                node.id
            )));
        }
        if let Some(parent) = node.parent_id {
            if !self.working.contains_key(&parent) {
                return Err(AppError::not_found(format!(
                    "Parent of node {} not found",
                    node.id
                )));
            }
        }
        let clash = self.working.values().any(|other| {
            other.id != node.id && other.parent_id == node.parent_id && other.name == node.name
        });
        if clash {
            return Err(AppError::conflict(format!(
                "A node named '{}' already exists in this folder",
                node.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeTransaction for MemoryNodeTransaction {
    async fn get(&mut self, id: NodeId) -> AppResult<Option<Node>> {
        Ok(self.working.get(&id).cloned())
    }

    async fn children(&mut self, parent_id: Option<NodeId>) -> AppResult<Vec<Node>> {
        Ok(children_of(&self.working, parent_id))
    }

    async fn insert(&mut self, node: &Node) -> AppResult<()> {
        self.check_injected(node.id, "insert")?;
        if self.working.contains_key(&node.id) {
            return Err(AppError::conflict(format!("Node {} already exists", node.id)));
        }
        self.check_constraints(node)?;
        self.working.insert(node.id, node.clone());
        Ok(())
    }

    async fn update(&mut self, node: &Node) -> AppResult<()> {
        self.check_injected(node.id, "update")?;
        if !self.working.contains_key(&node.id) {
            return Err(AppError::not_found(format!("Node {} not found", node.id)));
        }
        self.check_constraints(node)?;
        self.working.insert(node.id, node.clone());
        Ok(())
    }

    async fn remove(&mut self, id: NodeId) -> AppResult<bool> {
        self.check_injected(id, "delete")?;
        if self.working.values().any(|n| n.parent_id == Some(id)) {
            return Err(AppError::database(format!(
                "Node {id} is still referenced by its children"
            )));
        }
        Ok(self.working.remove(&id).is_some())
    }

    async fn count_matching(
        &mut self,
        parent_id: Option<NodeId>,
        name: &str,
        exclude: Option<NodeId>,
    ) -> AppResult<u64> {
        let count = self
            .working
            .values()
            .filter(|n| n.parent_id == parent_id && n.name == name && Some(n.id) != exclude)
            .count();
        Ok(count as u64)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        if this.inner.failing_commits.load(Ordering::SeqCst) {
            return Err(AppError::database("Injected commit failure"));
        }
        let mut committed = this
            .inner
            .committed
            .write()
            .map_err(|_| AppError::internal("Node map lock poisoned"))?;
        *committed = this.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use drivetree_core::error::ErrorKind;
    use drivetree_core::types::id::UserId;
    use drivetree_entity::node::NewNode;

    use super::*;

    async fn seed(repo: &MemoryNodeRepository, name: &str, parent: Option<NodeId>) -> Node {
        let node = NewNode::folder(name, parent, UserId::new()).into_node();
        let mut tx = repo.begin().await.unwrap();
        tx.insert(&node).await.unwrap();
        tx.commit().await.unwrap();
        node
    }

    #[tokio::test]
    async fn test_ancestors_are_root_first_and_inclusive() {
        let repo = MemoryNodeRepository::new();
        let a = seed(&repo, "a", None).await;
        let b = seed(&repo, "b", Some(a.id)).await;
        let c = seed(&repo, "c", Some(b.id)).await;

        let chain: Vec<NodeId> = repo.ancestors(c.id).await.unwrap().iter().map(|n| n.id).collect();
        assert_eq!(chain, vec![a.id, b.id, c.id]);
        assert!(repo.ancestors(NodeId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_descendants_include_self() {
        let repo = MemoryNodeRepository::new();
        let a = seed(&repo, "a", None).await;
        let b = seed(&repo, "b", Some(a.id)).await;
        seed(&repo, "c", Some(b.id)).await;
        seed(&repo, "other", None).await;

        assert_eq!(repo.descendants(a.id).await.unwrap().len(), 3);
        assert_eq!(repo.descendants(b.id).await.unwrap().len(), 2);
        assert!(repo.descendants(NodeId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let repo = MemoryNodeRepository::new();
        let node = NewNode::folder("tmp", None, UserId::new()).into_node();
        let mut tx = repo.begin().await.unwrap();
        tx.insert(&node).await.unwrap();
        assert!(tx.get(node.id).await.unwrap().is_some());
        assert!(repo.get(node.id).await.unwrap().is_none());
        tx.rollback().await.unwrap();
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_sibling_name_clash_is_conflict() {
        let repo = MemoryNodeRepository::new();
        let a = seed(&repo, "a", None).await;
        seed(&repo, "doc", Some(a.id)).await;

        let dup = NewNode::folder("doc", Some(a.id), UserId::new()).into_node();
        let mut tx = repo.begin().await.unwrap();
        let err = tx.insert(&dup).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(tx.count_matching(Some(a.id), "doc", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_with_children_fails() {
        let repo = MemoryNodeRepository::new();
        let a = seed(&repo, "a", None).await;
        seed(&repo, "b", Some(a.id)).await;

        let mut tx = repo.begin().await.unwrap();
        let err = tx.remove(a.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Database);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let repo = MemoryNodeRepository::new();
        let a = seed(&repo, "a", None).await;
        repo.fail_writes_for(a.id);

        let mut tx = repo.begin().await.unwrap();
        assert_eq!(tx.remove(a.id).await.unwrap_err().kind, ErrorKind::Database);
        drop(tx);

        repo.clear_failures();
        let mut tx = repo.begin().await.unwrap();
        assert!(tx.remove(a.id).await.unwrap());
        tx.commit().await.unwrap();
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_failed_remove_leaves_transaction_usable() {
        let repo = MemoryNodeRepository::new();
        let a = seed(&repo, "a", None).await;
        let b = seed(&repo, "b", None).await;
        repo.fail_writes_for(a.id);

        let mut tx = repo.begin().await.unwrap();
        assert_eq!(tx.remove(a.id).await.unwrap_err().kind, ErrorKind::Database);
        assert!(tx.remove(b.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(repo.get(a.id).await.unwrap().is_some());
        assert!(repo.get(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_committed_state() {
        let repo = MemoryNodeRepository::new();
        let a = seed(&repo, "a", None).await;
        repo.fail_commits(true);

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.remove(a.id).await.unwrap());
        assert_eq!(tx.commit().await.unwrap_err().kind, ErrorKind::Database);
        assert_eq!(repo.len(), 1);

        repo.clear_failures();
        let mut tx = repo.begin().await.unwrap();
        assert!(tx.remove(a.id).await.unwrap());
        tx.commit().await.unwrap();
        assert!(repo.is_empty());
    }
}
