//! Tree mutation engine.

pub mod delete;
pub mod download;
pub mod mutation;
pub mod service;
pub mod upload;

pub use delete::DeleteReport;
pub use service::{ComponentHealth, TreeService};
