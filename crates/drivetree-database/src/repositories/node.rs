//! PostgreSQL node repository.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use drivetree_core::error::{AppError, ErrorKind};
use drivetree_core::result::AppResult;
use drivetree_core::types::id::NodeId;
use drivetree_entity::node::Node;

use crate::store::{NodeStore, NodeTransaction, TreeQuery};

const NODE_COLUMNS: &str = "id, name, parent_id, is_folder, storage_key, content_type, \
     size_bytes, created_by, updated_by, created_at, updated_at";

/// Hard stop for recursive walks over a corrupted (cyclic) tree.
const MAX_DEPTH: i32 = 4096;

/// Repository for node records and recursive tree queries.
#[derive(Debug, Clone)]
pub struct PgNodeRepository {
    pool: PgPool,
}

impl PgNodeRepository {
    /// Create a new node repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TreeQuery for PgNodeRepository {
    async fn ancestors(&self, id: NodeId) -> AppResult<Vec<Node>> {
        sqlx::query_as::<_, Node>(&format!(
            "WITH RECURSIVE chain AS ( \
                SELECT n.*, 0 AS depth FROM nodes n WHERE n.id = $1 \
                UNION ALL \
                SELECT p.*, c.depth + 1 FROM nodes p \
                INNER JOIN chain c ON p.id = c.parent_id \
                WHERE c.depth < {MAX_DEPTH} \
             ) SELECT {NODE_COLUMNS} FROM chain ORDER BY depth DESC"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find ancestors", e))
    }

    async fn descendants(&self, id: NodeId) -> AppResult<Vec<Node>> {
        sqlx::query_as::<_, Node>(&format!(
            "WITH RECURSIVE tree AS ( \
                SELECT n.*, 0 AS depth FROM nodes n WHERE n.id = $1 \
                UNION ALL \
                SELECT c.*, t.depth + 1 FROM nodes c \
                INNER JOIN tree t ON c.parent_id = t.id \
                WHERE t.depth < {MAX_DEPTH} \
             ) SELECT {NODE_COLUMNS} FROM tree ORDER BY depth ASC, name ASC"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list descendants", e))
    }
}

#[async_trait]
impl NodeStore for PgNodeRepository {
    fn store_type(&self) -> &str {
        "postgres"
    }

    async fn get(&self, id: NodeId) -> AppResult<Option<Node>> {
        sqlx::query_as::<_, Node>(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find node", e))
    }

    async fn list_children(&self, parent_id: Option<NodeId>) -> AppResult<Vec<Node>> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes \
             WHERE parent_id IS NOT DISTINCT FROM $1 ORDER BY name ASC"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list children", e))
    }

    async fn begin(&self) -> AppResult<Box<dyn NodeTransaction>> {
        let tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        Ok(Box::new(PgNodeTransaction { tx }))
    }

    async fn health_check(&self) -> AppResult<bool> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM nodes WHERE FALSE")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Health check failed", e))
    }
}

/// A node transaction backed by a PostgreSQL transaction.
pub struct PgNodeTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgNodeTransaction {
    async fn execute_raw(&mut self, statement: &str) -> AppResult<()> {
        sqlx::query(statement)
            .execute(&mut *self.tx)
            .await
            .map(|_| ())
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, format!("Failed to run {statement}"), e)
            })
    }
}

/// Map a write error, turning sibling-name collisions into `Conflict`.
fn map_write_error(err: sqlx::Error, node: &Node, action: &str) -> AppError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => AppError::conflict(
            format!("A node named '{}' already exists in this folder", node.name),
        ),
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::not_found(format!("Parent of node {} not found", node.id))
        }
        _ => AppError::with_source(ErrorKind::Database, format!("Failed to {action} node"), err),
    }
}

#[async_trait]
impl NodeTransaction for PgNodeTransaction {
    async fn get(&mut self, id: NodeId) -> AppResult<Option<Node>> {
        sqlx::query_as::<_, Node>(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find node", e))
    }

    async fn children(&mut self, parent_id: Option<NodeId>) -> AppResult<Vec<Node>> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes \
             WHERE parent_id IS NOT DISTINCT FROM $1 ORDER BY name ASC"
        ))
        .bind(parent_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list children", e))
    }

    async fn insert(&mut self, node: &Node) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO nodes (id, name, parent_id, is_folder, storage_key, content_type, \
             size_bytes, created_by, updated_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(node.id)
        .bind(&node.name)
        .bind(node.parent_id)
        .bind(node.is_folder)
        .bind(&node.storage_key)
        .bind(&node.content_type)
        .bind(node.size_bytes)
        .bind(node.created_by)
        .bind(node.updated_by)
        .bind(node.created_at)
        .bind(node.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(e, node, "insert"))?;
        Ok(())
    }

    async fn update(&mut self, node: &Node) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE nodes SET name = $2, parent_id = $3, updated_by = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(node.id)
        .bind(&node.name)
        .bind(node.parent_id)
        .bind(node.updated_by)
        .bind(node.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(e, node, "update"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Node {} not found", node.id)));
        }
        Ok(())
    }

    async fn remove(&mut self, id: NodeId) -> AppResult<bool> {
        // A failed statement poisons the whole transaction unless it ran
        // inside a savepoint.
        self.execute_raw("SAVEPOINT node_remove").await?;
        let deleted = sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await;
        match deleted {
            Ok(result) => {
                self.execute_raw("RELEASE SAVEPOINT node_remove").await?;
                Ok(result.rows_affected() > 0)
            }
            Err(e) => {
                self.execute_raw("ROLLBACK TO SAVEPOINT node_remove").await?;
                Err(AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to delete node {id}"),
                    e,
                ))
            }
        }
    }

    async fn count_matching(
        &mut self,
        parent_id: Option<NodeId>,
        name: &str,
        exclude: Option<NodeId>,
    ) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM nodes \
             WHERE parent_id IS NOT DISTINCT FROM $1 AND name = $2 \
             AND ($3::uuid IS NULL OR id <> $3)",
        )
        .bind(parent_id)
        .bind(name)
        .bind(exclude)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count siblings", e))?;
        Ok(count as u64)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
        })
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.tx.rollback().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to roll back transaction", e)
        })
    }
}
