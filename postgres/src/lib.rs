//! Table-level PostgreSQL backup and restore.
//!
//! A run resolves the configured table patterns against the live database,
//! follows foreign keys when asked to, and then moves DDL, sequence positions
//! and CSV data between the database and a [`storage::StorageBackend`].

pub mod adapter;
pub mod backup;
pub mod cli;
pub mod failures;
pub mod ledger;
pub mod plan;
pub mod restore;
pub mod session;
pub mod wrapper;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Postgres error: {0}")]
    Database(tokio_postgres::Error),

    #[error("Configuration error: {0}")]
    Config(common::ConfigError),

    #[error("Storage error: {0}")]
    Storage(storage::StorageError),

    #[error("The {adapter} adapter does not support {operation}")]
    Unsupported {
        adapter: &'static str,
        operation: &'static str,
    },

    #[error("{tool} failed: {stderr}")]
    Transport { tool: String, stderr: String },

    #[error("CSV error: {0}")]
    Csv(csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Aborted: {0}")]
    Aborted(String),
}

impl From<std::io::Error> for PostgresError {
    fn from(err: std::io::Error) -> Self {
        PostgresError::Io(err)
    }
}

impl From<tokio_postgres::Error> for PostgresError {
    fn from(err: tokio_postgres::Error) -> Self {
        PostgresError::Database(err)
    }
}

impl From<common::ConfigError> for PostgresError {
    fn from(err: common::ConfigError) -> Self {
        PostgresError::Config(err)
    }
}

impl From<storage::StorageError> for PostgresError {
    fn from(err: storage::StorageError) -> Self {
        PostgresError::Storage(err)
    }
}

impl From<csv::Error> for PostgresError {
    fn from(err: csv::Error) -> Self {
        PostgresError::Csv(err)
    }
}

impl From<serde_json::Error> for PostgresError {
    fn from(err: serde_json::Error) -> Self {
        PostgresError::Serialization(err)
    }
}

impl From<serde_yaml::Error> for PostgresError {
    fn from(err: serde_yaml::Error) -> Self {
        PostgresError::Yaml(err)
    }
}

pub type Result<T> = std::result::Result<T, PostgresError>;

pub use adapter::{get_adapter, Adapter, QueryResult};
pub use backup::backup_all;
pub use failures::{capture_failures, RunReport};
pub use ledger::PgLedger;
pub use plan::{ForeignKey, SchemaOp, TableOp};
pub use restore::restore_all;
pub use session::Session;
