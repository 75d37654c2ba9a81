// ABOUTME: Per-table and per-run results of a synchronization
// ABOUTME: Serializable to JSON and renderable as a plain-text summary

use serde::Serialize;
use std::fmt::Write as _;

use super::diff::TablePlan;

/// Outcome of one reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Synced,
    MissingInTarget,
    NoPrimaryKey,
    Failed,
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TableStatus::Synced => "synced",
            TableStatus::MissingInTarget => "missing in target",
            TableStatus::NoPrimaryKey => "no primary key",
            TableStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub status: TableStatus,
    pub reference_rows: usize,
    pub target_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub target_only: usize,
    /// Reference rows skipped because a key column is NULL.
    #[serde(skip_serializing_if = "is_zero")]
    pub null_keys: usize,
    /// Reference columns the target lacks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TableReport {
    /// A table that was not compared.
    pub fn skipped(table: &str, status: TableStatus, message: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            status,
            reference_rows: 0,
            target_rows: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            target_only: 0,
            null_keys: 0,
            ignored_columns: Vec::new(),
            message: Some(message.into()),
        }
    }

    /// A compared table. Counts are taken from the plan whether or not it
    /// was applied.
    pub fn from_plan(plan: &TablePlan, reference_rows: usize, target_rows: usize) -> Self {
        Self {
            table: plan.table.clone(),
            status: TableStatus::Synced,
            reference_rows,
            target_rows,
            inserted: plan.inserts.len(),
            updated: plan.updates.len(),
            unchanged: plan.unchanged,
            target_only: plan.target_only,
            null_keys: plan.null_keys,
            ignored_columns: plan.layout.ignored_columns.clone(),
            message: None,
        }
    }
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub tables: Vec<TableReport>,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Check if every table was either synced or deliberately skipped.
    pub fn is_success(&self) -> bool {
        !self.tables.iter().any(|t| t.status == TableStatus::Failed)
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn count(&self, status: TableStatus) -> usize {
        self.tables.iter().filter(|t| t.status == status).count()
    }

    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.tables.iter().map(|t| t.updated).sum()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text table summary as printed by the CLI.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let name_width = self
            .tables
            .iter()
            .map(|t| t.table.len())
            .max()
            .unwrap_or(0)
            .max("TABLE".len());

        let _ = writeln!(
            out,
            "{:<width$}  {:<17}  {:>9}  {:>9}  {:>9}  {:>11}",
            "TABLE",
            "STATUS",
            "INSERTED",
            "UPDATED",
            "UNCHANGED",
            "TARGET-ONLY",
            width = name_width
        );
        for t in &self.tables {
            let _ = writeln!(
                out,
                "{:<width$}  {:<17}  {:>9}  {:>9}  {:>9}  {:>11}",
                t.table,
                t.status.to_string(),
                t.inserted,
                t.updated,
                t.unchanged,
                t.target_only,
                width = name_width
            );
        }

        let verb = if self.dry_run { "would be" } else { "were" };
        let _ = writeln!(
            out,
            "\n{} rows {} inserted, {} rows {} updated across {} synced tables ({} skipped, {} failed) in {}ms",
            self.total_inserted(),
            verb,
            self.total_updated(),
            verb,
            self.count(TableStatus::Synced),
            self.count(TableStatus::MissingInTarget) + self.count(TableStatus::NoPrimaryKey),
            self.count(TableStatus::Failed),
            self.duration_ms
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(table: &str, inserted: usize, updated: usize) -> TableReport {
        TableReport {
            inserted,
            updated,
            status: TableStatus::Synced,
            message: None,
            ..TableReport::skipped(table, TableStatus::Synced, "")
        }
    }

    #[test]
    fn test_totals_and_success() {
        let mut report = SyncReport::new(false);
        report.tables.push(synced("a", 2, 1));
        report.tables.push(synced("b", 3, 0));
        report
            .tables
            .push(TableReport::skipped("c", TableStatus::MissingInTarget, "absent"));

        assert!(report.is_success());
        assert_eq!(report.total_inserted(), 5);
        assert_eq!(report.total_updated(), 1);
        assert_eq!(report.count(TableStatus::MissingInTarget), 1);

        report
            .tables
            .push(TableReport::skipped("d", TableStatus::Failed, "boom"));
        assert!(!report.is_success());
    }

    #[test]
    fn test_json_uses_snake_case_status() {
        let mut report = SyncReport::new(true);
        report
            .tables
            .push(TableReport::skipped("logs", TableStatus::NoPrimaryKey, "no key"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["tables"][0]["status"], "no_primary_key");
        assert_eq!(json["tables"][0]["message"], "no key");
        assert!(json["tables"][0].get("ignored_columns").is_none());
        assert!(json["tables"][0].get("null_keys").is_none());
    }

    #[test]
    fn test_render_mentions_dry_run() {
        let mut report = SyncReport::new(true);
        report.tables.push(synced("users", 1, 1));

        let text = report.render();
        assert!(text.contains("users"));
        assert!(text.contains("1 rows would be inserted"));
    }
}
