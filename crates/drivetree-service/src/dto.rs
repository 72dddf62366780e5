//! Request DTOs accepted by the tree engine.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use validator::Validate;

use drivetree_core::error::{AppError, ErrorKind};
use drivetree_core::result::AppResult;
use drivetree_core::types::id::NodeId;

use crate::validation::check_name;

/// Create folder request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateFolderRequest {
    /// Parent folder, `None` for the root level.
    pub parent_id: Option<NodeId>,
    /// Folder name.
    #[validate(custom(function = "check_name"))]
    pub name: String,
}

/// Rename request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RenameRequest {
    /// New name.
    #[validate(custom(function = "check_name"))]
    pub name: String,
}

/// Move request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Destination folder, `None` for the root level.
    pub new_parent_id: Option<NodeId>,
}

/// File upload with its full content.
#[derive(Debug, Clone, Validate)]
pub struct UploadRequest {
    /// Target folder, `None` for the root level.
    pub parent_id: Option<NodeId>,
    /// File name.
    #[validate(custom(function = "check_name"))]
    pub name: String,
    /// MIME type forwarded to the blob store.
    pub content_type: Option<String>,
    /// File content.
    pub data: Bytes,
}

impl UploadRequest {
    /// Upload with no content type.
    pub fn new(parent_id: Option<NodeId>, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            parent_id,
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    /// Set the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Run derived validation, mapping failures to a `Validation` error.
pub fn validate_request<T: Validate>(request: &T) -> AppResult<()> {
    request.validate().map_err(|e| {
        AppError::with_source(ErrorKind::Validation, format!("Invalid request: {e}"), e)
    })
}
