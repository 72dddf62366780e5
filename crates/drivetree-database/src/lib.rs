//! # drivetree-database
//!
//! Tree metadata persistence: the node store and tree query ports, the
//! PostgreSQL pool with embedded migrations, and the PostgreSQL and
//! in-memory repositories behind those ports.

pub mod connection;
pub mod repositories;
pub mod store;

use std::sync::Arc;

use drivetree_core::config::AppConfig;
use drivetree_core::error::AppError;

pub use connection::DatabasePool;
pub use repositories::{MemoryNodeRepository, PgNodeRepository};
pub use store::{NodeStore, NodeTransaction, TreeBackend, TreeQuery};

/// Build the tree backend selected by `tree.store`.
///
/// The PostgreSQL backend connects and migrates before returning.
pub async fn connect_tree_backend(config: &AppConfig) -> Result<TreeBackend, AppError> {
    match config.tree.store.as_str() {
        "memory" => Ok(TreeBackend::from_shared(Arc::new(MemoryNodeRepository::new()))),
        "postgres" => {
            let db = DatabasePool::connect(&config.database).await?;
            db.migrate().await?;
            Ok(TreeBackend::from_shared(Arc::new(PgNodeRepository::new(
                db.pool().clone(),
            ))))
        }
        other => Err(AppError::configuration(format!(
            "Unknown tree store '{other}', expected 'postgres' or 'memory'"
        ))),
    }
}
