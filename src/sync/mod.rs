// ABOUTME: Synchronizer - brings a target database's rows in line with a reference database
// ABOUTME: Per table: introspect, load both sides, diff by primary key, apply in one transaction

pub mod diff;
pub mod report;

pub use diff::{diff_table, ColumnLayout, TablePlan};
pub use report::{SyncReport, TableReport, TableStatus};

use anyhow::{Context, Result};
use std::time::Instant;

use crate::filters::TableFilter;
use crate::schema::{ColumnInfo, NameMatching, Row, TableSchema};
use crate::session::{open_session, Access, Session};
use crate::utils::{sanitize_identifier, sanitize_url, validate_reference_target_different};

/// Options controlling a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// PostgreSQL schema whose tables are synchronized. Ignored for SQLite.
    pub schema: String,
    pub filter: TableFilter,
    /// Compute and report changes without writing them.
    pub dry_run: bool,
    /// Record per-table failures and move on instead of aborting the run.
    pub continue_on_error: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            filter: TableFilter::empty(),
            dry_run: false,
            continue_on_error: false,
        }
    }
}

/// Synchronizes row contents from a reference database into a target database.
///
/// Rows missing from the target are inserted and rows whose non-key columns
/// differ are updated. Rows that only exist in the target are never touched,
/// and tables that only exist in the reference are skipped.
pub struct Synchronizer {
    reference: Box<dyn Session>,
    target: Box<dyn Session>,
    options: SyncOptions,
}

impl Synchronizer {
    /// Open both databases.
    ///
    /// The reference is opened read-only. Fails before connecting if both
    /// connection strings point to the same database.
    pub async fn connect(reference_url: &str, target_url: &str, options: SyncOptions) -> Result<Self> {
        validate_reference_target_different(reference_url, target_url)?;

        tracing::info!("Connecting to reference database {}", sanitize_url(reference_url));
        let reference = open_session(reference_url, &options.schema, Access::ReadOnly)
            .await
            .context("Failed to open reference database")?;

        tracing::info!("Connecting to target database {}", sanitize_url(target_url));
        let target = open_session(target_url, &options.schema, Access::ReadWrite)
            .await
            .context("Failed to open target database")?;

        Ok(Self::from_sessions(reference, target, options))
    }

    /// Build a synchronizer over sessions that are already open.
    pub fn from_sessions(
        reference: Box<dyn Session>,
        target: Box<dyn Session>,
        options: SyncOptions,
    ) -> Self {
        Self {
            reference,
            target,
            options,
        }
    }

    /// Run one pass over every selected reference table.
    ///
    /// Each table's changes are committed on their own; an error aborts the
    /// run after rolling back the failing table unless `continue_on_error`
    /// is set.
    pub async fn synchronize(&mut self) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::new(self.options.dry_run);

        let mut reference_tables = self
            .reference
            .list_tables()
            .await
            .context("Failed to list reference tables")?;
        reference_tables.sort();

        for missing in self.options.filter.unknown_includes(&reference_tables) {
            tracing::warn!(
                "Included table '{}' does not exist in the reference database",
                sanitize_identifier(&missing)
            );
        }

        let target_tables = self
            .target
            .list_tables()
            .await
            .context("Failed to list target tables")?;
        let matching = self.target.name_matching();

        let selected: Vec<String> = reference_tables
            .into_iter()
            .filter(|t| self.options.filter.should_sync_table(t))
            .collect();

        tracing::info!(
            "Synchronizing {} tables ({} -> {}){}",
            selected.len(),
            self.reference.kind(),
            self.target.kind(),
            if self.options.dry_run { " [dry run]" } else { "" }
        );

        for table in &selected {
            let target_table = match matching.find(&target_tables, table) {
                Some(name) => name.to_string(),
                None => {
                    tracing::warn!(
                        "Table '{}' does not exist in the target database, skipping",
                        sanitize_identifier(table)
                    );
                    report.tables.push(TableReport::skipped(
                        table,
                        TableStatus::MissingInTarget,
                        "table does not exist in the target database",
                    ));
                    continue;
                }
            };

            match self.sync_table(table, &target_table).await {
                Ok(table_report) => report.tables.push(table_report),
                Err(e) if self.options.continue_on_error => {
                    tracing::error!(
                        "Failed to synchronize table '{}': {:#}",
                        sanitize_identifier(table),
                        e
                    );
                    report.tables.push(TableReport::skipped(
                        table,
                        TableStatus::Failed,
                        format!("{:#}", e),
                    ));
                }
                Err(e) => {
                    return Err(e.context(format!("Failed to synchronize table '{}'", table)));
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Synchronization finished: {} inserted, {} updated in {}ms",
            report.total_inserted(),
            report.total_updated(),
            report.duration_ms
        );

        Ok(report)
    }

    /// Synchronize reference `table` into `target_table`, the target's
    /// spelling of the same name.
    async fn sync_table(&mut self, table: &str, target_table: &str) -> Result<TableReport> {
        let display_name = sanitize_identifier(table);
        let matching = self.target.name_matching();

        let reference_schema = self
            .reference
            .describe_table(table)
            .await
            .context("Failed to describe reference table")?;
        let target_schema = self
            .target
            .describe_table(target_table)
            .await
            .context("Failed to describe target table")?;

        let layout = match ColumnLayout::resolve(&reference_schema, &target_schema, matching) {
            Ok(layout) => layout,
            Err(e) => {
                tracing::warn!("Skipping table '{}': {}", display_name, e);
                return Ok(TableReport::skipped(
                    table,
                    TableStatus::NoPrimaryKey,
                    e.to_string(),
                ));
            }
        };

        if !layout.ignored_columns.is_empty() {
            tracing::warn!(
                "Table '{}': columns not writable in the target are ignored: {}",
                display_name,
                layout.ignored_columns.join(", ")
            );
        }

        let columns = layout.columns();
        let reference_rows = self
            .reference
            .read_rows(&reference_schema, &columns, &layout.key_columns)
            .await
            .context("Failed to read reference rows")?;
        let target_rows = self
            .target
            .read_rows(&target_schema, &columns, &layout.key_columns)
            .await
            .context("Failed to read target rows")?;

        let reference_count = reference_rows.len();
        let target_count = target_rows.len();
        tracing::debug!(
            "Table '{}': {} reference rows, {} target rows",
            display_name,
            reference_count,
            target_count
        );

        let reference_rows =
            self.coerce_rows(&target_schema, &columns, matching, reference_rows)?;
        let plan = diff_table(table, &layout, reference_rows, target_rows)?;

        if plan.is_empty() {
            tracing::info!("Table '{}' is up to date", display_name);
        } else if self.options.dry_run {
            tracing::info!(
                "Table '{}': would insert {} rows, update {} rows",
                display_name,
                plan.inserts.len(),
                plan.updates.len()
            );
        } else {
            let affected = self.target.apply_plan(&target_schema, &plan).await?;
            tracing::info!(
                "Table '{}': inserted {} rows, updated {} rows ({} affected)",
                display_name,
                plan.inserts.len(),
                plan.updates.len(),
                affected
            );
        }

        if plan.null_keys > 0 {
            tracing::warn!(
                "Table '{}': {} reference rows have a NULL primary key value and were skipped",
                display_name,
                plan.null_keys
            );
        }

        if plan.target_only > 0 {
            tracing::debug!(
                "Table '{}': {} target-only rows left untouched",
                display_name,
                plan.target_only
            );
        }

        Ok(TableReport::from_plan(&plan, reference_count, target_count))
    }

    /// Convert reference rows into the values the target would store, so
    /// that comparison is done in the target's value domain.
    fn coerce_rows(
        &self,
        target_schema: &TableSchema,
        columns: &[String],
        matching: NameMatching,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>> {
        let target_columns: Vec<&ColumnInfo> = columns
            .iter()
            .map(|name| {
                target_schema.find_column(name, matching).with_context(|| {
                    format!("Column '{}' does not exist in the target table", name)
                })
            })
            .collect::<Result<_>>()?;

        rows.into_iter()
            .map(|row| {
                row.iter()
                    .zip(target_columns.iter())
                    .map(|(value, column)| self.target.coerce(column, value))
                    .collect::<Result<Row>>()
            })
            .collect()
    }
}
