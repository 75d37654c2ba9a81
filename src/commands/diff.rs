// ABOUTME: Diff command - reports what a sync would change
// ABOUTME: Runs the full comparison with writes disabled

use anyhow::Result;

use super::OutputFormat;
use crate::config::RunConfig;
use crate::sync::SyncReport;

/// Compare the databases and report the pending inserts and updates.
pub async fn diff(mut run: RunConfig, format: OutputFormat) -> Result<SyncReport> {
    run.options.dry_run = true;
    super::sync(run, format).await
}
