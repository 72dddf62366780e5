//! Redis lock provider.

pub mod client;
pub mod rw_lock;

pub use client::RedisClient;
pub use rw_lock::RedisLockProvider;
