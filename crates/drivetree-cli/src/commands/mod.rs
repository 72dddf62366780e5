//! CLI command definitions and dispatch.

pub mod check;
pub mod migrate;
pub mod transfer;
pub mod tree;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use drivetree_core::config::AppConfig;
use drivetree_core::error::AppError;
use drivetree_core::types::id::UserId;
use drivetree_lock::LockManager;
use drivetree_service::TreeService;
use drivetree_storage::BlobStoreManager;

use crate::output::OutputFormat;

/// DriveTree: a concurrent file and folder tree
#[derive(Debug, Parser)]
#[command(name = "drivetree", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Acting user for mutating commands
    #[arg(short, long, env = "DRIVETREE_USER")]
    pub user: Option<UserId>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply database migrations
    Migrate(migrate::MigrateArgs),
    /// List the children of a folder
    Ls(tree::LsArgs),
    /// Show one node
    Info(tree::InfoArgs),
    /// Show the path from the root level to a node
    Path(tree::InfoArgs),
    /// Create a folder
    Mkdir(tree::MkdirArgs),
    /// Rename a node
    Rename(tree::RenameArgs),
    /// Move a node to another folder
    Mv(tree::MoveArgs),
    /// Delete a node and everything beneath it
    Rm(tree::RemoveArgs),
    /// Upload a local file
    Upload(transfer::UploadArgs),
    /// Download a file
    Download(transfer::DownloadArgs),
    /// Check node store, lock provider and blob store
    Check,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: &AppConfig) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, config).await,
            Commands::Check => check::execute(config, self.format).await,
            Commands::Ls(args) => tree::list(args, &connect(config).await?, self.format).await,
            Commands::Info(args) => tree::info(args, &connect(config).await?, self.format).await,
            Commands::Path(args) => tree::path(args, &connect(config).await?, self.format).await,
            Commands::Mkdir(args) => {
                tree::mkdir(args, &connect(config).await?, self.acting_user()?, self.format).await
            }
            Commands::Rename(args) => {
                tree::rename(args, &connect(config).await?, self.acting_user()?, self.format).await
            }
            Commands::Mv(args) => {
                tree::move_node(args, &connect(config).await?, self.acting_user()?, self.format)
                    .await
            }
            Commands::Rm(args) => {
                tree::remove(args, &connect(config).await?, self.acting_user()?).await
            }
            Commands::Upload(args) => {
                transfer::upload(args, &connect(config).await?, self.acting_user()?, self.format)
                    .await
            }
            Commands::Download(args) => transfer::download(args, &connect(config).await?).await,
        }
    }

    fn acting_user(&self) -> Result<UserId, AppError> {
        self.user.ok_or_else(|| {
            AppError::validation("Mutating commands need --user <uuid> or DRIVETREE_USER")
        })
    }
}

/// Helper: wire the tree engine to the configured backends
pub async fn connect(config: &AppConfig) -> Result<TreeService, AppError> {
    let backend = drivetree_database::connect_tree_backend(config).await?;
    let locks = LockManager::new(&config.lock).await?;
    let blobs = BlobStoreManager::new(&config.storage).await?;
    info!(
        store = %config.tree.store,
        locks = %config.lock.provider,
        blobs = %config.storage.provider,
        "Tree engine ready"
    );
    Ok(TreeService::new(
        backend,
        Arc::new(locks),
        Arc::new(blobs),
        config,
    ))
}
