//! Configuration resolution for pgstash.
//!
//! Raw configuration arrives as a set of partial maps (command line, environment,
//! raw text, files). They are stacked in precedence order and resolved field by
//! field into the typed [`RootConfig`] tree consumed by the storage and postgres
//! crates.

pub mod config;
mod error;
pub mod matching;
pub mod paths;

pub use config::{
    BackupConfig, BackupTableConfig, ConfigStack, Connection, ConnectionParams, DdlConfig,
    LoggingConfig, RestoreConfig, RestoreTableConfig, RootConfig, S3Config, SentryConfig,
    TableConfig, TableParentConfig,
};
pub use error::ConfigError;

pub type Result<T> = std::result::Result<T, ConfigError>;
