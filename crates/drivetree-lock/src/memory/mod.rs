//! In-process lock provider.

pub mod table;

pub use table::MemoryLockProvider;
