//! Database-specific behaviour behind one interface.
//!
//! Adapters are looked up by dialect name; anything without a dedicated
//! adapter uses [`FallbackAdapter`], which sticks to portable SQL.

mod fallback;
mod postgres;

pub use self::fallback::FallbackAdapter;
pub use self::postgres::PostgresAdapter;

use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::plan::{order_by_dependencies, ForeignKey};
use crate::{Result, Session};

/// CSV output of a query, header row included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub bytes: Vec<u8>,
    pub row_count: u64,
}

#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Schema used to qualify bare table patterns.
    async fn default_schema(&self) -> Result<String>;

    /// Every user table as `schema.table`, in no particular order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Every foreign key edge between user tables.
    async fn collect_foreign_keys(&self) -> Result<Vec<ForeignKey>>;

    /// Every user table, parents before the tables referencing them.
    async fn collect_existing_tables(&self) -> Result<Vec<String>> {
        let tables = self.list_tables().await?;
        let foreign_keys = self.collect_foreign_keys().await?;
        debug!(
            "Found {} tables and {} foreign keys",
            tables.len(),
            foreign_keys.len()
        );
        Ok(order_by_dependencies(tables, &foreign_keys))
    }

    async fn export_query(&self, query: &str) -> Result<QueryResult>;

    /// Loads CSV (header row first) into `table`; returns the number of rows.
    async fn import_rows(&self, table: &str, csv: &[u8]) -> Result<u64>;

    async fn export_schema_ddl(&self, schema: &str) -> Result<Vec<u8>>;

    async fn export_table_ddl(&self, table: &str) -> Result<Vec<u8>>;

    async fn execute_sql(&self, sql: &[u8]) -> Result<()>;

    async fn truncate_table(&self, table: &str) -> Result<()>;

    /// Drops and recreates the target database, leaving the session connected to the new one.
    async fn reset_database(&self) -> Result<()>;

    /// Sequences owned by each table, keyed by `schema.table`.
    async fn collect_table_sequences(&self) -> Result<BTreeMap<String, Vec<String>>>;

    async fn collect_sequence_value(&self, sequence: &str) -> Result<i64>;

    async fn restore_sequence_value(&self, sequence: &str, value: i64) -> Result<()>;
}

type Constructor = fn(Arc<Session>) -> Box<dyn Adapter>;

fn postgres_adapter(session: Arc<Session>) -> Box<dyn Adapter> {
    Box::new(PostgresAdapter::new(session))
}

static ADAPTERS: &[(&str, Constructor)] = &[
    ("postgres", postgres_adapter),
    ("postgresql", postgres_adapter),
];

/// The adapter registered for `dialect`, or the fallback adapter.
pub fn get_adapter(session: Arc<Session>, dialect: &str) -> Box<dyn Adapter> {
    match ADAPTERS.iter().find(|(name, _)| name.eq_ignore_ascii_case(dialect)) {
        Some((_, constructor)) => constructor(session),
        None => {
            debug!("No adapter for `{dialect}`, using the fallback adapter");
            Box::new(FallbackAdapter::new(session))
        }
    }
}

/// Counts the records of a CSV document, header excluded.
pub(crate) fn count_rows(csv: &[u8]) -> Result<u64> {
    let mut reader = ::csv::ReaderBuilder::new().from_reader(csv);
    let mut count = 0;
    for record in reader.records() {
        record?;
        count += 1;
    }
    Ok(count)
}

/// Splits a CSV document into its header and the bytes after it.
pub(crate) fn split_header(csv: &[u8]) -> Result<(Vec<String>, &[u8])> {
    let mut reader = ::csv::ReaderBuilder::new().from_reader(csv);
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let offset = reader.position().byte() as usize;
    Ok((header, &csv[offset.min(csv.len())..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_with_embedded_newlines_count_once() {
        let csv = b"id,note\n1,\"two\nlines\"\n2,plain\n";
        assert_eq!(count_rows(csv).unwrap(), 2);
        assert_eq!(count_rows(b"id\n").unwrap(), 0);
        assert_eq!(count_rows(b"").unwrap(), 0);
    }

    #[test]
    fn header_is_split_from_the_body() {
        let (header, body) = split_header(b"id,\"first name\"\n1,a\n").unwrap();
        assert_eq!(header, ["id", "first name"]);
        assert_eq!(body, b"1,a\n");

        let (header, body) = split_header(b"").unwrap();
        assert!(header.is_empty());
        assert!(body.is_empty());
    }
}
