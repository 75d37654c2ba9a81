// ABOUTME: SQLite session - one file-backed connection for a synchronization run
// ABOUTME: Opens existing database files only and applies plans in one transaction

pub mod reader;
pub mod types;
pub mod writer;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

use crate::schema::{ColumnInfo, Row, TableSchema};
use crate::session::{Access, DatabaseKind, Session};
use crate::sync::diff::TablePlan;
use crate::value::Value;

pub struct SqliteSession {
    conn: Connection,
    access: Access,
}

impl SqliteSession {
    /// Open an existing SQLite database file.
    ///
    /// The file is never created. Read-only sessions are opened with
    /// `SQLITE_OPEN_READ_ONLY`, so SQLite rejects any write.
    pub fn open(path: &Path, access: Access) -> Result<Self> {
        if !path.is_file() {
            bail!("SQLite database file not found: {}", path.display());
        }

        let mode = match access {
            Access::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            Access::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
        };
        let conn = Connection::open_with_flags(path, mode | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;

        tracing::debug!("Opened SQLite database {} ({:?})", path.display(), access);

        Ok(Self { conn, access })
    }
}

#[async_trait]
impl Session for SqliteSession {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::SQLite
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        reader::list_tables(&self.conn)
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableSchema> {
        reader::describe_table(&self.conn, table)
    }

    async fn read_rows(
        &mut self,
        table: &TableSchema,
        columns: &[String],
        order_by: &[String],
    ) -> Result<Vec<Row>> {
        reader::read_rows(&self.conn, &table.name, columns, order_by)
    }

    fn coerce(&self, column: &ColumnInfo, value: &Value) -> Result<Value> {
        Ok(types::coerce(value, &column.data_type))
    }

    async fn apply_plan(&mut self, table: &TableSchema, plan: &TablePlan) -> Result<u64> {
        if self.access == Access::ReadOnly {
            bail!("Refusing to write to read-only session");
        }

        let tx = self
            .conn
            .transaction()
            .context("Failed to begin transaction")?;

        let affected = writer::apply_plan(&tx, &table.name, plan)?;

        tx.commit()
            .with_context(|| format!("Failed to commit changes to '{}'", table.name))?;

        Ok(affected)
    }
}
