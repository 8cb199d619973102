use std::fmt;

use thiserror::Error;

use crate::storage::Table;

/// A record source could not be read. The orchestrator degrades the source to an empty batch.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("failed to read {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to json parse {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read csv header of {origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },
    #[error("failed to open avro container {origin}: {source}")]
    Avro {
        origin: String,
        #[source]
        source: Box<apache_avro::Error>,
    },
    #[error("malformed document {origin}: {reason}")]
    Malformed { origin: String, reason: String },
}

/// The correlation of a whole batch failed, as opposed to a single record being skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelationError {
    #[error("none of the {total} impressions in the batch could be decoded")]
    MalformedBatch { total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Open,
    Schema,
    SchemaMismatch,
    Constraint,
    Write,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageErrorKind::Open => "open",
            StorageErrorKind::Schema => "schema",
            StorageErrorKind::SchemaMismatch => "schema_mismatch",
            StorageErrorKind::Constraint => "constraint",
            StorageErrorKind::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to open database {path}: {error}")]
    Open { path: String, error: sqlx::Error },
    #[error("failed to create table {table}: {error}")]
    Schema { table: Table, error: sqlx::Error },
    #[error("rows for {table} do not match its columns: expected {expected}, found {found}")]
    SchemaMismatch {
        table: Table,
        expected: String,
        found: String,
    },
    #[error("constraint violated writing row {row} of {table}: {error}")]
    Constraint {
        table: Table,
        row: usize,
        error: sqlx::Error,
    },
    #[error("{command} failed for {table}: {error}")]
    Write {
        table: Table,
        command: String,
        error: sqlx::Error,
    },
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::Open { .. } => StorageErrorKind::Open,
            StorageError::Schema { .. } => StorageErrorKind::Schema,
            StorageError::SchemaMismatch { .. } => StorageErrorKind::SchemaMismatch,
            StorageError::Constraint { .. } => StorageErrorKind::Constraint,
            StorageError::Write { .. } => StorageErrorKind::Write,
        }
    }

    // Classify a failed insert, constraint violations get their own kind
    pub(crate) fn from_insert(table: Table, row: usize, error: sqlx::Error) -> Self {
        let is_constraint = matches!(
            &error,
            sqlx::Error::Database(db) if !matches!(db.kind(), sqlx::error::ErrorKind::Other)
        );
        if is_constraint {
            StorageError::Constraint { table, row, error }
        } else {
            StorageError::Write {
                table,
                command: format!("insert of row {row}"),
                error,
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("batch did not finish within {seconds}s")]
    Timeout { seconds: u64 },
}
