//! Lock key builders.
//!
//! Every node is guarded by one read/write lock. The root level has no
//! node of its own, so it gets a sentinel key.

use drivetree_core::types::id::NodeId;

/// Prefix shared by every tree lock key.
const PREFIX: &str = "rwlock:file";

/// Lock key guarding a single node.
pub fn node(id: NodeId) -> String {
    format!("{PREFIX}:{id}")
}

/// Lock key guarding the set of names at the root level.
pub fn root() -> String {
    format!("{PREFIX}:root")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key() {
        let id: NodeId = "00000000-0000-0000-0000-000000000000".parse().unwrap();
        assert_eq!(
            node(id),
            "rwlock:file:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_root_key_differs_from_nodes() {
        assert_eq!(root(), "rwlock:file:root");
        assert_ne!(root(), node(NodeId::new()));
    }
}
