// ABOUTME: PostgreSQL session - one client connection scoped to a synchronization run
// ABOUTME: Wires the catalog reader and change writer into the Session trait

pub mod connection;
pub mod reader;
pub mod types;
pub mod writer;

pub use connection::{connect, init_tls_policy};
pub use reader::TableReader;
pub use types::PgKind;
pub use writer::ChangeWriter;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio_postgres::Client;

use crate::schema::{ColumnInfo, Row, TableSchema};
use crate::session::{Access, DatabaseKind, Session};
use crate::sync::diff::TablePlan;
use crate::value::Value;

pub struct PostgresSession {
    client: Client,
    schema: String,
    access: Access,
}

impl PostgresSession {
    /// Connect and prepare the session for `access`.
    ///
    /// Read-only sessions switch `default_transaction_read_only` on, so the
    /// server itself rejects any accidental write.
    pub async fn connect(url: &str, schema: &str, access: Access) -> Result<Self> {
        let client = connect(url).await?;

        if access == Access::ReadOnly {
            client
                .batch_execute("SET default_transaction_read_only = on")
                .await
                .context("Failed to mark session read-only")?;
        }

        Ok(Self {
            client,
            schema: schema.to_string(),
            access,
        })
    }
}

#[async_trait]
impl Session for PostgresSession {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::PostgreSQL
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        TableReader::new(&self.client).list_tables(&self.schema).await
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableSchema> {
        let reader = TableReader::new(&self.client);
        let columns = reader.get_columns(&self.schema, table).await?;
        if columns.is_empty() {
            bail!("Table {}.{} does not exist", self.schema, table);
        }
        let primary_key = reader.get_primary_key(&self.schema, table).await?;

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            primary_key,
        })
    }

    async fn read_rows(
        &mut self,
        table: &TableSchema,
        columns: &[String],
        order_by: &[String],
    ) -> Result<Vec<Row>> {
        let typed: Vec<(String, PgKind)> = columns
            .iter()
            .map(|name| {
                let column = table.column(name).with_context(|| {
                    format!("Column {} does not exist in table {}", name, table.name)
                })?;
                Ok((name.clone(), PgKind::from_type_name(&column.data_type)))
            })
            .collect::<Result<_>>()?;

        TableReader::new(&self.client)
            .read_rows(&self.schema, &table.name, &typed, order_by)
            .await
    }

    fn coerce(&self, column: &ColumnInfo, value: &Value) -> Result<Value> {
        types::coerce(value, PgKind::from_type_name(&column.data_type)).with_context(|| {
            format!(
                "Value for column {} does not fit type {}",
                column.name, column.data_type
            )
        })
    }

    async fn apply_plan(&mut self, table: &TableSchema, plan: &TablePlan) -> Result<u64> {
        if self.access == Access::ReadOnly {
            bail!("Refusing to write to read-only session");
        }

        let tx = self
            .client
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        let affected = ChangeWriter::new(&tx)
            .apply_plan(&self.schema, table, plan)
            .await?;

        tx.commit().await.with_context(|| {
            format!("Failed to commit changes to {}.{}", self.schema, table.name)
        })?;

        Ok(affected)
    }
}
