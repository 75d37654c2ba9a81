// ABOUTME: ChangeWriter for PostgreSQL - applies a table plan inside a transaction
// ABOUTME: Plain INSERTs for missing rows and per-row UPDATEs of differing columns only

use anyhow::{Context, Result};
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

use super::types::{placeholder, to_sql, PgKind};
use crate::schema::TableSchema;
use crate::sync::diff::{ensure_single_row_updated, format_key, TablePlan};
use crate::utils::{quote_ident, quote_table};
use crate::value::Value;

/// A target column as the writer binds it.
#[derive(Debug, Clone)]
pub struct WriteColumn {
    pub name: String,
    pub kind: PgKind,
    pub type_name: String,
}

impl WriteColumn {
    fn placeholder(&self, index: usize) -> String {
        placeholder(index, self.kind, &self.type_name)
    }
}

/// Resolve `names` against the target table's columns.
pub fn write_columns(table: &TableSchema, names: &[String]) -> Result<Vec<WriteColumn>> {
    names
        .iter()
        .map(|name| {
            let column = table.column(name).with_context(|| {
                format!("Column {} does not exist in target table {}", name, table.name)
            })?;
            Ok(WriteColumn {
                name: column.name.clone(),
                kind: PgKind::from_type_name(&column.data_type),
                type_name: column.data_type.clone(),
            })
        })
        .collect()
}

/// Writes a table plan to the target PostgreSQL database.
///
/// All statements run on the caller's transaction; the caller commits.
pub struct ChangeWriter<'a> {
    tx: &'a Transaction<'a>,
}

impl<'a> ChangeWriter<'a> {
    /// Create a new ChangeWriter for the given transaction.
    pub fn new(tx: &'a Transaction<'a>) -> Self {
        Self { tx }
    }

    /// Apply inserts then updates of `plan` to `schema.table`.
    ///
    /// # Returns
    ///
    /// The number of rows affected.
    pub async fn apply_plan(
        &self,
        schema: &str,
        table: &TableSchema,
        plan: &TablePlan,
    ) -> Result<u64> {
        let key_len = plan.layout.key_len();
        let key_columns = write_columns(table, &plan.layout.key_columns)?;
        let mut total_affected = 0u64;

        if !plan.inserts.is_empty() {
            let columns = write_columns(table, &plan.layout.columns())?;
            let query = build_insert_query(schema, &table.name, &columns);
            let statement = self
                .tx
                .prepare(&query)
                .await
                .with_context(|| format!("Failed to prepare insert into {}.{}", schema, table.name))?;

            for row in &plan.inserts {
                let params = bind_values(row.iter().zip(columns.iter()))?;
                let affected = self
                    .tx
                    .execute(&statement, &param_refs(&params))
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to insert row {} into {}.{}",
                            format_key(&row[..key_len]),
                            schema,
                            table.name
                        )
                    })?;
                total_affected += affected;
            }
        }

        for update in &plan.updates {
            let names: Vec<String> = update.changes.iter().map(|c| c.column.clone()).collect();
            let set_columns = write_columns(table, &names)?;
            let query = build_update_query(schema, &table.name, &set_columns, &key_columns);

            let values = update
                .changes
                .iter()
                .map(|c| &c.after)
                .zip(set_columns.iter())
                .chain(update.key.iter().zip(key_columns.iter()));
            let params = bind_values(values)?;

            let affected = self
                .tx
                .execute(&query, &param_refs(&params))
                .await
                .with_context(|| {
                    format!(
                        "Failed to update row {} in {}.{}",
                        format_key(&update.key),
                        schema,
                        table.name
                    )
                })?;
            ensure_single_row_updated(&table.name, &update.key, affected)?;
            total_affected += affected;
        }

        Ok(total_affected)
    }
}

fn bind_values<'v>(
    values: impl Iterator<Item = (&'v Value, &'v WriteColumn)>,
) -> Result<Vec<Box<dyn ToSql + Sync + Send>>> {
    values
        .map(|(value, column)| {
            to_sql(value, column.kind)
                .with_context(|| format!("Invalid value for column {}", column.name))
        })
        .collect()
}

fn param_refs(params: &[Box<dyn ToSql + Sync + Send>]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|v| v.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// Build an insert query for one row.
///
/// Generates a query like:
/// ```sql
/// INSERT INTO "schema"."table" ("id", "name", "price")
/// VALUES ($1, $2, $3::text::numeric(10,2))
/// ```
fn build_insert_query(schema: &str, table: &str, columns: &[WriteColumn]) -> String {
    let quoted_columns: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let placeholders: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(idx, c)| c.placeholder(idx + 1))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_table(Some(schema), table),
        quoted_columns.join(", "),
        placeholders.join(", ")
    )
}

/// Build an update query setting `set_columns` on the row matching the key.
///
/// ```sql
/// UPDATE "schema"."table" SET "name" = $1, "age" = $2
/// WHERE "org_id" = $3 AND "user_id" = $4
/// ```
fn build_update_query(
    schema: &str,
    table: &str,
    set_columns: &[WriteColumn],
    key_columns: &[WriteColumn],
) -> String {
    let assignments: Vec<String> = set_columns
        .iter()
        .enumerate()
        .map(|(idx, c)| format!("{} = {}", quote_ident(&c.name), c.placeholder(idx + 1)))
        .collect();

    let offset = set_columns.len();
    let conditions: Vec<String> = key_columns
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            format!(
                "{} = {}",
                quote_ident(&c.name),
                c.placeholder(offset + idx + 1)
            )
        })
        .collect();

    format!(
        "UPDATE {} SET {} WHERE {}",
        quote_table(Some(schema), table),
        assignments.join(", "),
        conditions.join(" AND ")
    )
}
