use std::path::Path;

use sqlx::{
    query::Query,
    sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use tracing::{debug, info};

use crate::error::StorageError;

pub mod schema;

pub use schema::{Column, SqlValue, Table, TableRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub table: Table,
    pub rows_written: usize,
}

/// The relational store the pipeline persists into. All writes to a table go through a single
/// pooled connection, so there is at most one writer at a time.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|error| StorageError::Open {
                path: path.display().to_string(),
                error,
            })?;

        info!("Opened database at {}", path.display());
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates every table the pipeline writes to. Safe to call on every run.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for table in Table::ALL {
            sqlx::query(&table.create_statement())
                .execute(&self.pool)
                .await
                .map_err(|error| StorageError::Schema { table, error })?;
        }
        Ok(())
    }

    /// Inserts one row per record inside a single transaction. Either every row commits or
    /// none do. Records whose column mapping doesn't match `destination` are rejected before
    /// anything is written.
    pub async fn write_batch<R: TableRow>(
        &self,
        destination: Table,
        records: &[R],
    ) -> Result<WriteSummary, StorageError> {
        let expected = destination.column_names();
        if R::COLUMNS != expected.as_slice() {
            return Err(StorageError::SchemaMismatch {
                table: destination,
                expected: expected.join(", "),
                found: R::COLUMNS.join(", "),
            });
        }

        let rows: Vec<Vec<SqlValue>> = records.iter().map(R::values).collect();
        if let Some(bad) = rows.iter().find(|r| r.len() != expected.len()) {
            return Err(StorageError::SchemaMismatch {
                table: destination,
                expected: format!("{} values", expected.len()),
                found: format!("{} values", bad.len()),
            });
        }

        if rows.is_empty() {
            return Ok(WriteSummary {
                table: destination,
                rows_written: 0,
            });
        }

        let sql = destination.insert_statement();
        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|error| write_error(destination, "begin", error))?;

        // Returning early drops txn, which rolls back everything inserted so far
        for (idx, row) in rows.into_iter().enumerate() {
            let query = row.into_iter().fold(sqlx::query(&sql), bind_value);
            query
                .execute(&mut *txn)
                .await
                .map_err(|error| StorageError::from_insert(destination, idx, error))?;
        }

        let rows_written = records.len();
        txn.commit()
            .await
            .map_err(|error| write_error(destination, "commit", error))?;

        debug!("Committed {} rows to {}", rows_written, destination);
        Ok(WriteSummary {
            table: destination,
            rows_written,
        })
    }

    pub async fn row_count(&self, table: Table) -> Result<i64, StorageError> {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table.name()))
            .fetch_one(&self.pool)
            .await
            .map_err(|error| write_error(table, "count", error))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn write_error(table: Table, command: &str, error: sqlx::Error) -> StorageError {
    StorageError::Write {
        table,
        command: command.to_string(),
        error,
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Integer(v) => query.bind(v),
        SqlValue::Real(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Null => query.bind(None::<String>),
    }
}
