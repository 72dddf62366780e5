//! # drivetree-lock
//!
//! Lock provider implementations for DriveTree. Supports two modes:
//!
//! - **memory**: in-process lock table on [dashmap](https://crates.io/crates/dashmap)
//!   with waiter wake-up, for single-process deployments and tests
//! - **redis**: Lua-scripted read/write locks shared by every process that
//!   points at the same Redis
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::LockManager;
