//! # drivetree-service
//!
//! The tree engine for DriveTree. [`HierarchicalLockCoordinator`] turns a
//! node and an operation into an ordered lock plan and holds it as one
//! unit; [`TreeService`] runs every file and folder operation through that
//! plan, one metadata transaction per operation.
//!
//! Services follow constructor injection: the node store, lock provider
//! and blob store are provided at construction time via `Arc` references.

pub mod coordinator;
pub mod dto;
pub mod tree;
pub mod validation;

pub use coordinator::{CombinedLock, HierarchicalLockCoordinator, LockPlan};
pub use dto::{CreateFolderRequest, MoveRequest, RenameRequest, UploadRequest};
pub use tree::{ComponentHealth, DeleteReport, TreeService};
