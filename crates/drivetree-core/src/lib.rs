//! # drivetree-core
//!
//! Core crate for DriveTree. Contains the unified error system, the
//! configuration schemas, typed identifiers, and the port traits for the
//! lock provider and the blob store.
//!
//! This crate has **no** internal dependencies on other DriveTree crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
