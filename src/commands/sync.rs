// ABOUTME: Sync command - applies reference rows to the target database
// ABOUTME: Inserts missing rows and updates differing rows, never deletes

use anyhow::Result;

use super::{emit_report, OutputFormat};
use crate::config::RunConfig;
use crate::sync::{SyncReport, Synchronizer};

/// Synchronize the target database with the reference database.
///
/// Tables that do not exist in the target are skipped with a warning. With
/// `dry_run` set in the run options nothing is written.
///
/// # Errors
///
/// Fails if either database cannot be opened, if both connection strings
/// name the same database, or if a table fails (immediately, or after the
/// run when `continue_on_error` is set).
pub async fn sync(run: RunConfig, format: OutputFormat) -> Result<SyncReport> {
    if run.options.dry_run {
        tracing::info!("Dry run: no changes will be written to the target");
    }

    let mut synchronizer = Synchronizer::connect(&run.reference, &run.target, run.options).await?;
    let report = synchronizer.synchronize().await?;

    emit_report(&report, format)?;
    Ok(report)
}
