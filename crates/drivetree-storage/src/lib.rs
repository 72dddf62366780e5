//! # drivetree-storage
//!
//! Blob store implementations for DriveTree: local filesystem, in-memory
//! (with fault injection for tests), and S3-compatible object stores.

pub mod manager;
pub mod providers;

pub use manager::BlobStoreManager;
