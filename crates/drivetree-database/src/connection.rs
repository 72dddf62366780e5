//! PostgreSQL pool and schema migrations.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use drivetree_core::config::DatabaseConfig;
use drivetree_core::error::{AppError, ErrorKind};

/// Shared handle to the metadata database.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open a pool sized and timed from `[database]`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            "Connecting to metadata database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to connect to metadata database: {e}"),
                    e,
                )
            })?;

        Ok(Self { pool })
    }

    /// The underlying sqlx pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply every pending migration under `migrations/`.
    pub async fn migrate(&self) -> Result<(), AppError> {
        info!("Applying metadata migrations");
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to run migrations: {e}"),
                    e,
                )
            })?;
        info!("Metadata schema is up to date");
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Health check failed", e))
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Hide the password of a connection URL for logging.
fn mask_password(url: &str) -> String {
    let Some(at) = url.rfind('@') else {
        return url.to_string();
    };
    let authority_start = url.find("://").map(|p| p + 3).unwrap_or(0);
    match url[authority_start..at].find(':') {
        Some(colon) => format!(
            "{}:****{}",
            &url[..authority_start + colon],
            &url[at..]
        ),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://tree:secret@db:5432/drivetree"),
            "postgres://tree:****@db:5432/drivetree"
        );
        assert_eq!(
            mask_password("postgres://tree@db/drivetree"),
            "postgres://tree@db/drivetree"
        );
        assert_eq!(
            mask_password("postgres://localhost:5432/drivetree"),
            "postgres://localhost:5432/drivetree"
        );
    }
}
