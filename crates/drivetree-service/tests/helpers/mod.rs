//! Shared test helpers for engine tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use drivetree_core::config::AppConfig;
use drivetree_core::types::id::{NodeId, UserId};
use drivetree_database::repositories::MemoryNodeRepository;
use drivetree_database::store::TreeBackend;
use drivetree_entity::node::Node;
use drivetree_lock::memory::MemoryLockProvider;
use drivetree_service::{TreeService, UploadRequest};
use drivetree_storage::providers::MemoryBlobStore;

/// Engine wired to in-memory backends, with handles on each backend.
pub struct TestApp {
    /// The engine under test.
    pub service: TreeService,
    /// Node records.
    pub repo: Arc<MemoryNodeRepository>,
    /// Lock table.
    pub locks: Arc<MemoryLockProvider>,
    /// Blob content.
    pub blobs: Arc<MemoryBlobStore>,
    /// Acting user.
    pub user: UserId,
}

/// Configuration tuned for tests: short waits, in-memory backends.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.tree.store = "memory".into();
    config.storage.provider = "memory".into();
    config.storage.max_upload_size_bytes = 1024;
    config.lock.provider = "memory".into();
    config.lock.acquire_timeout_ms = 5_000;
    config.lock.attempt_wait_ms = 50;
    config.lock.retry_interval_ms = 5;
    config.tree.max_plan_attempts = 8;
    config
}

impl TestApp {
    /// Create an engine with [`test_config`].
    pub fn new() -> Self {
        Self::build(test_config(), MemoryBlobStore::new())
    }

    /// Create an engine with a custom configuration.
    pub fn with_config(config: AppConfig) -> Self {
        Self::build(config, MemoryBlobStore::new())
    }

    /// Create an engine over a prepared blob store.
    pub fn with_blobs(blobs: MemoryBlobStore) -> Self {
        Self::build(test_config(), blobs)
    }

    fn build(config: AppConfig, blobs: MemoryBlobStore) -> Self {
        let repo = Arc::new(MemoryNodeRepository::new());
        let locks = Arc::new(MemoryLockProvider::new());
        let blobs = Arc::new(blobs);
        let service = TreeService::new(
            TreeBackend::from_shared(repo.clone()),
            locks.clone(),
            blobs.clone(),
            &config,
        );
        Self {
            service,
            repo,
            locks,
            blobs,
            user: UserId::new(),
        }
    }

    /// Create a folder, panicking on failure.
    pub async fn folder(&self, parent: Option<NodeId>, name: &str) -> Node {
        self.service
            .create_folder(parent, name, self.user)
            .await
            .unwrap_or_else(|e| panic!("create folder {name}: {e}"))
    }

    /// Upload a file, panicking on failure.
    pub async fn file(&self, parent: Option<NodeId>, name: &str, content: &str) -> Node {
        self.service
            .upload(
                UploadRequest::new(parent, name, content.as_bytes().to_vec()),
                self.user,
            )
            .await
            .unwrap_or_else(|e| panic!("upload {name}: {e}"))
    }

    /// Sorted names of the children of `parent`.
    pub async fn child_names(&self, parent: Option<NodeId>) -> Vec<String> {
        let mut names: Vec<String> = self
            .service
            .list_children(parent)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        names.sort();
        names
    }

    /// Download a file into memory.
    pub async fn read(&self, id: NodeId) -> drivetree_core::result::AppResult<Vec<u8>> {
        let mut sink = Vec::new();
        self.service.download(id, &mut sink).await?;
        Ok(sink)
    }

    /// Panic if any committed node is its own ancestor or has a missing parent.
    pub fn assert_forest(&self) {
        let nodes = self.repo.all().unwrap();
        let by_id: std::collections::HashMap<NodeId, &Node> =
            nodes.iter().map(|n| (n.id, n)).collect();
        for node in &nodes {
            let mut seen = HashSet::new();
            let mut cursor = Some(node.id);
            while let Some(current) = cursor {
                assert!(seen.insert(current), "cycle through {current}");
                let entry = by_id
                    .get(&current)
                    .unwrap_or_else(|| panic!("dangling parent {current}"));
                cursor = entry.parent_id;
            }
        }
    }

    /// Panic if any committed file cannot be downloaded in full.
    pub async fn assert_files_readable(&self) {
        let files: Vec<Node> = self
            .repo
            .all()
            .unwrap()
            .into_iter()
            .filter(|n| !n.is_folder)
            .collect();
        for file in files {
            let bytes = self
                .read(file.id)
                .await
                .unwrap_or_else(|e| panic!("{} unreadable: {e}", file.name));
            assert_eq!(bytes.len() as i64, file.size_bytes, "{} truncated", file.name);
        }
    }

    /// Panic if two siblings share a name.
    pub fn assert_unique_names(&self) {
        let nodes = self.repo.all().unwrap();
        let mut seen = HashSet::new();
        for node in &nodes {
            assert!(
                seen.insert((node.parent_id, node.name.clone())),
                "duplicate name {:?} under {:?}",
                node.name,
                node.parent_id
            );
        }
    }
}
