//! Node persistence and tree traversal ports.
//!
//! [`NodeStore`] hands out [`NodeTransaction`]s, the unit of work a single
//! tree mutation runs in. [`TreeQuery`] answers the two recursive questions
//! lock planning needs. Both are implemented for PostgreSQL and for an
//! in-process map.

use std::sync::Arc;

use async_trait::async_trait;

use drivetree_core::result::AppResult;
use drivetree_core::types::id::NodeId;
use drivetree_entity::node::Node;

/// Recursive traversal over the parent-pointer tree.
///
/// Answers reflect the tree at call time only; callers lock before relying
/// on them.
#[async_trait]
pub trait TreeQuery: Send + Sync + std::fmt::Debug + 'static {
    /// The chain from the root-level ancestor down to `id`, inclusive.
    /// Empty when `id` does not exist.
    async fn ancestors(&self, id: NodeId) -> AppResult<Vec<Node>>;

    /// `id` and every node transitively parented under it.
    /// Empty when `id` does not exist.
    async fn descendants(&self, id: NodeId) -> AppResult<Vec<Node>>;
}

/// Transactional persistence of node records.
#[async_trait]
pub trait NodeStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the backend name (e.g., "postgres", "memory").
    fn store_type(&self) -> &str;

    /// Look up a committed node.
    async fn get(&self, id: NodeId) -> AppResult<Option<Node>>;

    /// Committed direct children of `parent_id` (root level when `None`), by name.
    async fn list_children(&self, parent_id: Option<NodeId>) -> AppResult<Vec<Node>>;

    /// Open a transaction.
    async fn begin(&self) -> AppResult<Box<dyn NodeTransaction>>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// One open unit of work. Dropping it without [`commit`](Self::commit)
/// discards every change.
#[async_trait]
pub trait NodeTransaction: Send {
    /// Look up a node as seen by this transaction.
    async fn get(&mut self, id: NodeId) -> AppResult<Option<Node>>;

    /// Direct children of `parent_id` as seen by this transaction, by name.
    async fn children(&mut self, parent_id: Option<NodeId>) -> AppResult<Vec<Node>>;

    /// Insert a new record. A sibling with the same name is `Conflict`.
    async fn insert(&mut self, node: &Node) -> AppResult<()>;

    /// Overwrite an existing record. A missing record is `NotFound`.
    async fn update(&mut self, node: &Node) -> AppResult<()>;

    /// Remove a record. Returns `false` if it did not exist.
    ///
    /// A failed removal changes nothing and leaves the transaction usable,
    /// so the caller may keep the record and carry on.
    async fn remove(&mut self, id: NodeId) -> AppResult<bool>;

    /// Count nodes under `parent_id` named `name`, ignoring `exclude`.
    async fn count_matching(
        &mut self,
        parent_id: Option<NodeId>,
        name: &str,
        exclude: Option<NodeId>,
    ) -> AppResult<u64>;

    /// Make every change visible.
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// Discard every change.
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// A node store paired with the traversal over the same data.
#[derive(Debug, Clone)]
pub struct TreeBackend {
    /// Record persistence.
    pub store: Arc<dyn NodeStore>,
    /// Ancestor/descendant traversal.
    pub query: Arc<dyn TreeQuery>,
}

impl TreeBackend {
    /// Pair one value implementing both ports.
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: NodeStore + TreeQuery,
    {
        Self {
            store: backend.clone(),
            query: backend,
        }
    }
}
