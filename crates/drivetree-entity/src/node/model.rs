//! Tree node entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use drivetree_core::types::id::{NodeId, UserId};

use super::kind::NodeKind;

/// A file or folder in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Node {
    /// Unique node identifier, generated before the record is written.
    pub id: NodeId,
    /// Node name, unique among its siblings.
    pub name: String,
    /// Parent folder (None for root-level nodes).
    pub parent_id: Option<NodeId>,
    /// Whether this node is a folder.
    pub is_folder: bool,
    /// Blob store key of the content (files only).
    pub storage_key: Option<String>,
    /// MIME type recorded at upload (files only).
    pub content_type: Option<String>,
    /// Content length in bytes (0 for folders).
    pub size_bytes: i64,
    /// The user who created the node.
    pub created_by: UserId,
    /// The user who last changed the node.
    pub updated_by: UserId,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// When the node was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Check if this node sits at the root level.
    pub fn is_root_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        !self.is_folder
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        if self.is_folder {
            NodeKind::Folder
        } else {
            NodeKind::File
        }
    }

    /// Record a change by `user` at the current time.
    pub fn touch(&mut self, user: UserId) {
        self.updated_by = user;
        self.updated_at = Utc::now();
    }
}

/// Data required to create a node record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    /// Pre-generated identifier.
    pub id: NodeId,
    /// Node name (already validated and trimmed).
    pub name: String,
    /// Parent folder (None for root level).
    pub parent_id: Option<NodeId>,
    /// Whether the node is a folder.
    pub is_folder: bool,
    /// Blob store key (files only).
    pub storage_key: Option<String>,
    /// MIME type (files only).
    pub content_type: Option<String>,
    /// Content length in bytes.
    pub size_bytes: i64,
    /// The creating user.
    pub created_by: UserId,
}

impl NewNode {
    /// A zero-size folder.
    pub fn folder(name: impl Into<String>, parent_id: Option<NodeId>, created_by: UserId) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            parent_id,
            is_folder: true,
            storage_key: None,
            content_type: None,
            size_bytes: 0,
            created_by,
        }
    }

    /// A file whose content is already stored under `storage_key`.
    pub fn file(
        id: NodeId,
        name: impl Into<String>,
        parent_id: Option<NodeId>,
        storage_key: impl Into<String>,
        size_bytes: i64,
        created_by: UserId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id,
            is_folder: false,
            storage_key: Some(storage_key.into()),
            content_type: None,
            size_bytes,
            created_by,
        }
    }

    /// Attach a MIME type.
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Materialize the record with both audit timestamps set to now.
    pub fn into_node(self) -> Node {
        let now = Utc::now();
        Node {
            id: self.id,
            name: self.name,
            parent_id: self.parent_id,
            is_folder: self.is_folder,
            storage_key: self.storage_key,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            created_by: self.created_by,
            updated_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_has_no_content() {
        let user = UserId::new();
        let node = NewNode::folder("docs", None, user).into_node();
        assert!(node.is_folder);
        assert!(node.is_root_level());
        assert_eq!(node.size_bytes, 0);
        assert!(node.storage_key.is_none());
        assert_eq!(node.kind(), NodeKind::Folder);
        assert_eq!(node.updated_by, user);
    }

    #[test]
    fn test_file_keeps_storage_key() {
        let parent = NodeId::new();
        let id = NodeId::new();
        let node = NewNode::file(id, "a.txt", Some(parent), "blob-1", 12, UserId::new())
            .with_content_type(Some("text/plain".into()))
            .into_node();
        assert_eq!(node.id, id);
        assert!(node.is_file());
        assert_eq!(node.storage_key.as_deref(), Some("blob-1"));
        assert_eq!(node.content_type.as_deref(), Some("text/plain"));
        assert_eq!(node.parent_id, Some(parent));
    }

    #[test]
    fn test_touch_updates_modifier() {
        let creator = UserId::new();
        let editor = UserId::new();
        let mut node = NewNode::folder("x", None, creator).into_node();
        node.touch(editor);
        assert_eq!(node.created_by, creator);
        assert_eq!(node.updated_by, editor);
        assert!(node.updated_at >= node.created_at);
    }
}
