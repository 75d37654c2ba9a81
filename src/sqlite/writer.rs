// ABOUTME: Applies a table plan to a SQLite database
// ABOUTME: Cached INSERT for missing rows and per-row UPDATEs of differing columns only

use anyhow::{Context, Result};
use rusqlite::{params_from_iter, Transaction};

use super::types::to_sqlite;
use crate::sync::diff::{ensure_single_row_updated, format_key, TablePlan};
use crate::utils::quote_ident;

/// Apply inserts then updates of `plan` on `tx`. The caller commits.
///
/// Returns the number of rows affected.
pub fn apply_plan(tx: &Transaction<'_>, table: &str, plan: &TablePlan) -> Result<u64> {
    let layout = &plan.layout;
    let key_len = layout.key_len();
    let mut total_affected = 0u64;

    if !plan.inserts.is_empty() {
        let query = build_insert_query(table, &layout.columns());
        let mut stmt = tx
            .prepare_cached(&query)
            .with_context(|| format!("Failed to prepare insert into '{}'", table))?;

        for row in &plan.inserts {
            let affected = stmt
                .execute(params_from_iter(row.iter().map(to_sqlite)))
                .with_context(|| {
                    format!(
                        "Failed to insert row {} into '{}'",
                        format_key(&row[..key_len]),
                        table
                    )
                })?;
            total_affected += affected as u64;
        }
    }

    for update in &plan.updates {
        let set_columns: Vec<String> = update.changes.iter().map(|c| c.column.clone()).collect();
        let query = build_update_query(table, &set_columns, &layout.key_columns);

        let params = update
            .changes
            .iter()
            .map(|c| to_sqlite(&c.after))
            .chain(update.key.iter().map(to_sqlite));

        let affected = tx
            .execute(&query, params_from_iter(params))
            .with_context(|| {
                format!(
                    "Failed to update row {} in '{}'",
                    format_key(&update.key),
                    table
                )
            })?;
        ensure_single_row_updated(table, &update.key, affected as u64)?;
        total_affected += affected as u64;
    }

    Ok(total_affected)
}

fn build_insert_query(table: &str, columns: &[String]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        quoted.join(", "),
        placeholders.join(", ")
    )
}

fn build_update_query(table: &str, set_columns: &[String], key_columns: &[String]) -> String {
    let assignments: Vec<String> = set_columns
        .iter()
        .enumerate()
        .map(|(idx, c)| format!("{} = ?{}", quote_ident(c), idx + 1))
        .collect();

    let offset = set_columns.len();
    let conditions: Vec<String> = key_columns
        .iter()
        .enumerate()
        .map(|(idx, c)| format!("{} = ?{}", quote_ident(c), offset + idx + 1))
        .collect();

    format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table),
        assignments.join(", "),
        conditions.join(" AND ")
    )
}
