// ABOUTME: SQLite database introspection and data reading
// ABOUTME: Functions to list tables, describe columns and keys, and read table data

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

use super::types::from_sqlite;
use crate::schema::{ColumnInfo, Row, TableSchema};
use crate::utils::{quote_ident, quote_table};

/// List all user tables in a SQLite database
///
/// Queries sqlite_master system table for user-created tables.
/// Excludes sqlite_* system tables (sqlite_sequence, sqlite_stat1, etc.)
///
/// # Returns
///
/// Sorted vector of table names
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    tracing::debug!("Listing tables from SQLite database");

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .context("Failed to prepare statement to list tables")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query table list")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect table names")?;

    tracing::debug!("Found {} user tables in SQLite database", tables.len());

    Ok(tables)
}

/// Describe a table's columns and primary key
///
/// Uses `PRAGMA table_info`, whose `pk` column gives each key column's
/// 1-based position in the primary key (0 for non-key columns).
pub fn describe_table(conn: &Connection, table: &str) -> Result<TableSchema> {
    let query = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to prepare table_info for '{}'", table))?;

    let entries = stmt
        .query_map([], |row| {
            let column = ColumnInfo {
                name: row.get(1)?,
                data_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                is_nullable: row.get::<_, i64>(3)? == 0,
                has_default: row.get::<_, Option<String>>(4)?.is_some(),
                is_generated: false,
            };
            let pk_position: i64 = row.get(5)?;
            Ok((column, pk_position))
        })
        .with_context(|| format!("Failed to query table_info for '{}'", table))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to collect table_info for '{}'", table))?;

    if entries.is_empty() {
        bail!("Table '{}' does not exist", table);
    }

    let mut key_positions: Vec<(i64, String)> = entries
        .iter()
        .filter(|(_, pk)| *pk > 0)
        .map(|(column, pk)| (*pk, column.name.clone()))
        .collect();
    key_positions.sort();

    Ok(TableSchema {
        name: table.to_string(),
        columns: entries.into_iter().map(|(column, _)| column).collect(),
        primary_key: key_positions.into_iter().map(|(_, name)| name).collect(),
    })
}

/// Read all rows of a table, projected onto `columns`
///
/// # Arguments
///
/// * `conn` - SQLite database connection
/// * `table` - Table name
/// * `columns` - Columns to select, in output order
/// * `order_by` - Columns to sort by (normally the primary key)
///
/// # Performance
///
/// Loads all rows into memory.
pub fn read_rows(
    conn: &Connection,
    table: &str,
    columns: &[String],
    order_by: &[String],
) -> Result<Vec<Row>> {
    let query = build_select_query(table, columns, order_by);

    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to prepare statement for table '{}'", table))?;

    let width = columns.len();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|idx| row.get::<_, rusqlite::types::Value>(idx).map(from_sqlite))
                .collect::<Result<Row, _>>()
        })
        .with_context(|| format!("Failed to query rows from table '{}'", table))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to collect rows from table '{}'", table))?;

    tracing::debug!("Read {} rows from table '{}'", rows.len(), table);

    Ok(rows)
}

fn build_select_query(table: &str, columns: &[String], order_by: &[String]) -> String {
    let select_list = if columns.is_empty() {
        "1".to_string()
    } else {
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut query = format!("SELECT {} FROM {}", select_list, quote_table(None, table));
    if !order_by.is_empty() {
        let order: Vec<String> = order_by.iter().map(|c| quote_ident(c)).collect();
        query.push_str(" ORDER BY ");
        query.push_str(&order.join(", "));
    }
    query
}
