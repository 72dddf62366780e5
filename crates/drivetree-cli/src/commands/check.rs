//! Backend health check command.

use serde::Serialize;

use crate::output::{self, OutputFormat};
use drivetree_core::config::AppConfig;
use drivetree_core::error::AppError;

#[derive(Debug, Serialize)]
struct CheckReport<'a> {
    store: &'a str,
    store_ok: bool,
    locks: &'a str,
    locks_ok: bool,
    blobs: &'a str,
    blobs_ok: bool,
}

fn status(ok: bool) -> &'static str {
    if ok { "ok" } else { "unreachable" }
}

/// Execute the check command
pub async fn execute(config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let service = super::connect(config).await?;
    let health = service.health_check().await;

    match format {
        OutputFormat::Table => {
            output::print_kv(
                &format!("store ({})", config.tree.store),
                status(health.store),
            );
            output::print_kv(
                &format!("locks ({})", config.lock.provider),
                status(health.locks),
            );
            output::print_kv(
                &format!("blobs ({})", config.storage.provider),
                status(health.blobs),
            );
        }
        OutputFormat::Json => {
            let report = CheckReport {
                store: &config.tree.store,
                store_ok: health.store,
                locks: &config.lock.provider,
                locks_ok: health.locks,
                blobs: &config.storage.provider,
                blobs_ok: health.blobs,
            };
            let json = serde_json::to_string_pretty(&report)?;
            println!("{json}");
        }
    }

    if health.is_healthy() {
        output::print_success("All backends healthy.");
        Ok(())
    } else {
        output::print_warning("One or more backends did not answer.");
        Err(AppError::internal("Health check failed"))
    }
}
