//! Database migration command.

use clap::Args;

use crate::output;
use drivetree_core::config::AppConfig;
use drivetree_core::error::AppError;
use drivetree_database::DatabasePool;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Only report whether the database is reachable
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the migrate command
pub async fn execute(args: &MigrateArgs, config: &AppConfig) -> Result<(), AppError> {
    let db = DatabasePool::connect(&config.database).await?;

    if args.dry_run {
        let reachable = db.health_check().await?;
        output::print_kv("database", if reachable { "reachable" } else { "unreachable" });
    } else {
        println!("Running database migrations...");
        db.migrate().await?;
        output::print_success("All migrations applied successfully.");
    }

    db.close().await;
    Ok(())
}
