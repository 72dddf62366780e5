//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field carries a serde default so an empty file yields a
//! runnable single-process setup.

pub mod database;
pub mod lock;
pub mod logging;
pub mod storage;
pub mod tree;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::database::DatabaseConfig;
pub use self::lock::{LockConfig, RedisLockConfig};
pub use self::logging::LoggingConfig;
pub use self::storage::{LocalStorageConfig, S3StorageConfig, StorageConfig};
pub use self::tree::TreeConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Validate, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata database settings.
    #[serde(default)]
    #[validate(nested)]
    pub database: DatabaseConfig,
    /// Lock provider settings.
    #[serde(default)]
    #[validate(nested)]
    pub lock: LockConfig,
    /// Blob store settings.
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,
    /// Tree engine settings.
    #[serde(default)]
    #[validate(nested)]
    pub tree: TreeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// Layers, later wins: the given file, an optional `config/<env>` overlay
    /// selected by `DRIVETREE_ENV`, and environment variables prefixed with
    /// `DRIVETREE__` (e.g. `DRIVETREE__LOCK__PROVIDER=redis`).
    pub fn load(path: &str) -> Result<Self, AppError> {
        let mut builder =
            config::Config::builder().add_source(config::File::with_name(path).required(false));

        if let Ok(env) = std::env::var("DRIVETREE_ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("DRIVETREE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        app.validate()
            .map_err(|e| AppError::configuration(format!("Invalid configuration: {e}")))?;
        Ok(app)
    }
}
