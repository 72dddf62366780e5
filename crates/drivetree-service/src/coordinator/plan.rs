//! Lock plans: the ordered keys an operation must hold.

use drivetree_lock::keys;

/// Ordered, duplicate-free list of lock keys.
///
/// Segments are appended in acquisition order: the root-level sentinel,
/// then ancestor chains root-first, then descendant sets. A key already in
/// the plan keeps its first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockPlan {
    keys: Vec<String>,
}

impl LockPlan {
    /// An empty plan. Acquiring it holds nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the sentinel guarding names at the root level.
    pub fn with_root_namespace(self) -> Self {
        self.then([keys::root()])
    }

    /// Append a segment, skipping keys the plan already has.
    pub fn then(mut self, segment: impl IntoIterator<Item = String>) -> Self {
        for key in segment {
            if !self.keys.contains(&key) {
                self.keys.push(key);
            }
        }
        self
    }

    /// The keys in acquisition order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the plan holds nothing.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn into_keys(self) -> Vec<String> {
        self.keys
    }
}
