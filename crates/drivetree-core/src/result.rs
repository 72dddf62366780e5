//! Convenience result type alias for DriveTree.

use crate::error::AppError;

/// A specialized `Result` type for DriveTree operations.
pub type AppResult<T> = Result<T, AppError>;
