//! Port traits defined in `drivetree-core` and implemented by other crates.

pub mod lock;
pub mod storage;

pub use lock::{LockMode, LockProvider};
pub use storage::{BlobReceipt, BlobStore, ByteStream};
