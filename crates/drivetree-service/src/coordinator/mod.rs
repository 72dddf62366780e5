//! Hierarchical locking over the node tree.

pub mod guard;
pub mod plan;
pub mod service;

pub use guard::CombinedLock;
pub use plan::LockPlan;
pub use service::HierarchicalLockCoordinator;
