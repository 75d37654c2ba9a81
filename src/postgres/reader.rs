// ABOUTME: TableReader for PostgreSQL - introspects tables and loads full table contents
// ABOUTME: Columns and primary keys come from the system catalogs of one schema

use anyhow::{Context, Result};
use tokio_postgres::Client;

use super::types::{decode, select_expr, PgKind};
use crate::schema::{ColumnInfo, Row};
use crate::utils::{quote_ident, quote_table};

/// Reads structure and rows of PostgreSQL tables in one schema.
pub struct TableReader<'a> {
    client: &'a Client,
}

impl<'a> TableReader<'a> {
    /// Create a new TableReader for the given PostgreSQL client connection.
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Get list of all tables in a schema.
    pub async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT tablename FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
                &[&schema],
            )
            .await
            .with_context(|| format!("Failed to list tables in schema {}", schema))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    /// Get column information for a table.
    ///
    /// `data_type` holds the full `format_type()` rendering including type
    /// modifiers, so it can be used verbatim in casts.
    pub async fn get_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = self
            .client
            .query(
                "SELECT a.attname,
                        format_type(a.atttypid, a.atttypmod),
                        NOT a.attnotnull,
                        a.atthasdef OR a.attidentity <> '',
                        a.attgenerated <> ''
                 FROM pg_attribute a
                 JOIN pg_class c ON c.oid = a.attrelid
                 JOIN pg_namespace n ON n.oid = c.relnamespace
                 WHERE n.nspname = $1
                   AND c.relname = $2
                   AND a.attnum > 0
                   AND NOT a.attisdropped
                 ORDER BY a.attnum",
                &[&schema, &table],
            )
            .await
            .with_context(|| format!("Failed to get columns for {}.{}", schema, table))?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: row.get(2),
                has_default: row.get(3),
                is_generated: row.get(4),
            })
            .collect())
    }

    /// Get primary key columns for a table, in key order.
    pub async fn get_primary_key(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT a.attname
                 FROM pg_index i
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
                 JOIN pg_class c ON c.oid = i.indrelid
                 JOIN pg_namespace n ON n.oid = c.relnamespace
                 WHERE i.indisprimary
                   AND n.nspname = $1
                   AND c.relname = $2
                 ORDER BY array_position(i.indkey, a.attnum)",
                &[&schema, &table],
            )
            .await
            .with_context(|| format!("Failed to get primary key for {}.{}", schema, table))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    /// Read every row of a table.
    ///
    /// # Arguments
    ///
    /// * `schema` - The schema name (e.g., "public")
    /// * `table` - The table name
    /// * `columns` - Columns to select, each with its decoding kind
    /// * `order_by` - Columns to sort by (normally the primary key)
    ///
    /// # Returns
    ///
    /// Rows with values in the order of `columns`.
    pub async fn read_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[(String, PgKind)],
        order_by: &[String],
    ) -> Result<Vec<Row>> {
        let query = build_select_query(schema, table, columns, order_by);

        let rows = self
            .client
            .query(&query, &[])
            .await
            .with_context(|| format!("Failed to read rows from {}.{}", schema, table))?;

        rows.iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, (name, kind))| {
                        decode(row, idx, *kind).with_context(|| {
                            format!("Failed to decode column {} of {}.{}", name, schema, table)
                        })
                    })
                    .collect::<Result<Row>>()
            })
            .collect()
    }
}

/// Build the full-table SELECT.
///
/// ```sql
/// SELECT "id", "price"::text FROM "public"."items" ORDER BY "id"
/// ```
fn build_select_query(
    schema: &str,
    table: &str,
    columns: &[(String, PgKind)],
    order_by: &[String],
) -> String {
    let select_list = if columns.is_empty() {
        "1".to_string()
    } else {
        columns
            .iter()
            .map(|(name, kind)| select_expr(name, *kind))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut query = format!(
        "SELECT {} FROM {}",
        select_list,
        quote_table(Some(schema), table)
    );

    if !order_by.is_empty() {
        let order: Vec<String> = order_by.iter().map(|c| quote_ident(c)).collect();
        query.push_str(" ORDER BY ");
        query.push_str(&order.join(", "));
    }

    query
}
