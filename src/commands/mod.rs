// ABOUTME: Command implementations for the refsync CLI
// ABOUTME: Exports sync (apply changes) and diff (report changes only)

pub mod diff;
pub mod sync;

pub use diff::diff;
pub use sync::sync;

use anyhow::{bail, Result};

use crate::sync::SyncReport;

/// How a command prints its report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print the report on stdout and turn recorded table failures into an error.
fn emit_report(report: &SyncReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", report.render()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    if !report.is_success() {
        bail!(
            "{} table(s) failed to synchronize",
            report.count(crate::sync::TableStatus::Failed)
        );
    }
    Ok(())
}
