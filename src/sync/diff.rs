// ABOUTME: Per-table difference detection between reference and target rows
// ABOUTME: Indexes rows by primary key and decides insert vs update for each reference row

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};

use crate::schema::{NameMatching, Row, RowKey, TableSchema};
use crate::value::Value;

/// Columns taking part in the comparison of one table.
///
/// Key columns come from the reference primary key. Data columns are the
/// reference's non-key columns that the target can store, in reference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub key_columns: Vec<String>,
    pub data_columns: Vec<String>,
    /// Reference columns the target does not have (or cannot write).
    pub ignored_columns: Vec<String>,
}

impl ColumnLayout {
    /// Derive the layout for `reference` against `target`, looking reference
    /// column names up in the target under `matching`.
    ///
    /// Fails if the reference table has no primary key, or if a key column is
    /// missing from the target.
    pub fn resolve(
        reference: &TableSchema,
        target: &TableSchema,
        matching: NameMatching,
    ) -> Result<Self> {
        if reference.primary_key.is_empty() {
            bail!(
                "Table '{}' has no primary key in the reference database",
                reference.name
            );
        }

        for key in &reference.primary_key {
            match target.find_column(key, matching) {
                None => bail!(
                    "Primary key column '{}' of table '{}' is missing in the target database",
                    key,
                    reference.name
                ),
                Some(column) if column.is_generated => bail!(
                    "Primary key column '{}' of table '{}' is generated in the target database",
                    key,
                    reference.name
                ),
                Some(_) => {}
            }
        }

        let mut data_columns = Vec::new();
        let mut ignored_columns = Vec::new();
        for column in &reference.columns {
            if reference.is_key_column(&column.name) {
                continue;
            }
            match target.find_column(&column.name, matching) {
                Some(target_column) if !target_column.is_generated => {
                    data_columns.push(column.name.clone())
                }
                _ => ignored_columns.push(column.name.clone()),
            }
        }

        Ok(Self {
            key_columns: reference.primary_key.clone(),
            data_columns,
            ignored_columns,
        })
    }

    /// All compared columns: key columns first, then data columns.
    pub fn columns(&self) -> Vec<String> {
        self.key_columns
            .iter()
            .chain(self.data_columns.iter())
            .cloned()
            .collect()
    }

    pub fn key_len(&self) -> usize {
        self.key_columns.len()
    }
}

/// Change to one column of an existing target row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    pub column: String,
    pub before: Value,
    pub after: Value,
}

/// Update of one existing target row, identified by its key.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub key: RowKey,
    pub changes: Vec<ColumnChange>,
}

/// Everything needed to bring one target table in line with the reference.
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub table: String,
    pub layout: ColumnLayout,
    /// Full rows aligned with `layout.columns()`.
    pub inserts: Vec<Row>,
    pub updates: Vec<RowUpdate>,
    pub unchanged: usize,
    /// Target keys absent from the reference. Counted, never touched.
    pub target_only: usize,
    /// Reference rows with a NULL key value. They cannot be matched to a
    /// target row and are neither inserted nor updated.
    pub null_keys: usize,
}

impl TablePlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }
}

/// Split a row laid out as `key columns ++ data columns` into its key.
fn key_of(row: &Row, key_len: usize) -> RowKey {
    row[..key_len].to_vec()
}

/// NULL never equals NULL in SQL, so a key holding one identifies no row.
fn has_null_key(row: &Row, key_len: usize) -> bool {
    row[..key_len].iter().any(|v| matches!(v, Value::Null))
}

/// Index rows by primary key.
///
/// Rows must be laid out with the key columns first. Rows with a NULL key
/// value are left out. A repeated key means the snapshot violates primary
/// key uniqueness and is reported as an error.
pub fn index_rows(table: &str, rows: Vec<Row>, key_len: usize) -> Result<HashMap<RowKey, Row>> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        if row.len() < key_len {
            bail!(
                "Row in table '{}' has {} values, expected at least {}",
                table,
                row.len(),
                key_len
            );
        }
        if has_null_key(&row, key_len) {
            continue;
        }
        let key = key_of(&row, key_len);
        if let Some(previous) = index.insert(key, row) {
            bail!(
                "Duplicate primary key {} in table '{}'",
                format_key(&previous[..key_len]),
                table
            );
        }
    }
    Ok(index)
}

/// Compare reference rows with target rows and plan the writes.
///
/// Both row sets must be laid out as `layout.columns()`. Reference rows are
/// visited in load order so inserts are applied in a stable order.
pub fn diff_table(
    table: &str,
    layout: &ColumnLayout,
    reference_rows: Vec<Row>,
    target_rows: Vec<Row>,
) -> Result<TablePlan> {
    let key_len = layout.key_len();
    let width = key_len + layout.data_columns.len();
    let target_count = target_rows.len();
    let target = index_rows(table, target_rows, key_len)?;
    let target_null_keys = target_count - target.len();

    let mut seen: HashSet<RowKey> = HashSet::with_capacity(reference_rows.len());
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    let mut unchanged = 0;
    let mut null_keys = 0;

    for row in reference_rows {
        if row.len() != width {
            bail!(
                "Reference row in table '{}' has {} values, expected {}",
                table,
                row.len(),
                width
            );
        }
        if has_null_key(&row, key_len) {
            null_keys += 1;
            continue;
        }
        let key = key_of(&row, key_len);
        if !seen.insert(key.clone()) {
            bail!(
                "Duplicate primary key {} in table '{}'",
                format_key(&key),
                table
            );
        }

        match target.get(&key) {
            None => inserts.push(row),
            Some(existing) => {
                let changes: Vec<ColumnChange> = layout
                    .data_columns
                    .iter()
                    .enumerate()
                    .filter_map(|(i, column)| {
                        let after = &row[key_len + i];
                        let before = &existing[key_len + i];
                        (after != before).then(|| ColumnChange {
                            column: column.clone(),
                            before: before.clone(),
                            after: after.clone(),
                        })
                    })
                    .collect();

                if changes.is_empty() {
                    unchanged += 1;
                } else {
                    updates.push(RowUpdate { key, changes });
                }
            }
        }
    }

    let target_only =
        target.keys().filter(|key| !seen.contains(*key)).count() + target_null_keys;

    Ok(TablePlan {
        table: table.to_string(),
        layout: layout.clone(),
        inserts,
        updates,
        unchanged,
        target_only,
        null_keys,
    })
}

/// Fail unless an UPDATE by primary key touched exactly one row.
///
/// Zero means the target row vanished or its key no longer compares equal;
/// more means the target does not enforce the key.
pub fn ensure_single_row_updated(table: &str, key: &[Value], affected: u64) -> Result<()> {
    if affected != 1 {
        bail!(
            "Update of row {} in '{}' matched {} rows, expected 1",
            format_key(key),
            table,
            affected
        );
    }
    Ok(())
}

/// Render a key for messages, e.g. `(1, a)`.
pub fn format_key(key: &[Value]) -> String {
    let parts: Vec<String> = key.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(", "))
}
