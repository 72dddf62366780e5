//! Input rules applied before any lock or storage access.

use drivetree_core::error::AppError;
use drivetree_core::result::AppResult;
use drivetree_core::types::id::{NodeId, UserId};

/// Maximum node name length, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Characters never allowed in a node name.
pub const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Validates a node name and returns it trimmed.
pub fn validate_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::validation(format!(
            "Name exceeds maximum length of {MAX_NAME_LENGTH} characters"
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(AppError::validation(format!(
            "Name contains invalid character '{c}'"
        )));
    }
    if name == "." {
        return Err(AppError::validation("Name must not be '.'"));
    }
    if name.ends_with('.') && name != ".." {
        return Err(AppError::validation("Name must not end with '.'"));
    }
    Ok(name.to_string())
}

/// Rejects the nil user id.
pub fn validate_user(user: UserId) -> AppResult<()> {
    if user.is_nil() {
        return Err(AppError::validation("Acting user is required"));
    }
    Ok(())
}

/// Rejects the nil node id.
pub fn validate_node_id(id: NodeId) -> AppResult<()> {
    if id.is_nil() {
        return Err(AppError::validation("Node id is required"));
    }
    Ok(())
}

/// `validator` hook for DTO name fields.
pub(crate) fn check_name(name: &str) -> Result<(), validator::ValidationError> {
    validate_name(name).map(|_| ()).map_err(|e| {
        let mut err = validator::ValidationError::new("node_name");
        err.message = Some(e.message.into());
        err
    })
}
