use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_postgres::SimpleQueryMessage;

use super::{Adapter, QueryResult};
use crate::plan::ForeignKey;
use crate::session::{quote_ident, quote_qualified};
use crate::{PostgresError, Result, Session};

const LIST_TABLES: &str = "
    SELECT table_schema || '.' || table_name
    FROM information_schema.tables
    WHERE table_type = 'BASE TABLE'
      AND table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY table_schema, table_name";

const FOREIGN_KEYS: &str = "
    SELECT DISTINCT
        child.table_schema || '.' || child.table_name,
        parent.table_schema || '.' || parent.table_name
    FROM information_schema.referential_constraints rc
    JOIN information_schema.table_constraints child
      ON child.constraint_schema = rc.constraint_schema
     AND child.constraint_name = rc.constraint_name
    JOIN information_schema.table_constraints parent
      ON parent.constraint_schema = rc.unique_constraint_schema
     AND parent.constraint_name = rc.unique_constraint_name";

/// Rows per generated INSERT statement.
const INSERT_BATCH: usize = 500;

/// Portable behaviour for dialects without a dedicated adapter.
///
/// Data moves through plain queries and INSERT statements; DDL, database resets
/// and sequences are not available.
pub struct FallbackAdapter {
    session: Arc<Session>,
}

impl FallbackAdapter {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn unsupported(operation: &'static str) -> PostgresError {
        PostgresError::Unsupported {
            adapter: "fallback",
            operation,
        }
    }
}

/// Renders a CSV field as a SQL literal: `true`/`false` become booleans and
/// the empty string becomes NULL.
fn literal(value: &str) -> String {
    if value.is_empty() {
        "NULL".to_string()
    } else if value.eq_ignore_ascii_case("true") {
        "TRUE".to_string()
    } else if value.eq_ignore_ascii_case("false") {
        "FALSE".to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// Builds INSERT statements for a CSV document; returns the SQL and the row count.
fn insert_statements(table: &str, csv: &[u8]) -> Result<(String, u64)> {
    let mut reader = csv::ReaderBuilder::new().from_reader(csv);
    let columns: Vec<String> = reader.headers()?.iter().map(quote_ident).collect();
    if columns.is_empty() {
        return Ok((String::new(), 0));
    }

    let prefix = format!(
        "INSERT INTO {} ({}) VALUES\n",
        quote_qualified(table),
        columns.join(", ")
    );

    let mut sql = String::new();
    let mut batch: Vec<String> = Vec::with_capacity(INSERT_BATCH);
    let mut rows = 0;

    let flush = |batch: &mut Vec<String>, sql: &mut String| {
        if !batch.is_empty() {
            sql.push_str(&prefix);
            sql.push_str(&batch.join(",\n"));
            sql.push_str(";\n");
            batch.clear();
        }
    };

    for record in reader.records() {
        let record = record?;
        let values: Vec<String> = record.iter().map(literal).collect();
        batch.push(format!("({})", values.join(", ")));
        rows += 1;

        if batch.len() == INSERT_BATCH {
            flush(&mut batch, &mut sql);
        }
    }
    flush(&mut batch, &mut sql);

    Ok((sql, rows))
}

#[async_trait]
impl Adapter for FallbackAdapter {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn default_schema(&self) -> Result<String> {
        Ok("public".to_string())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.session.client().await;
        let rows = client.query(LIST_TABLES, &[]).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn collect_foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let client = self.session.client().await;
        let rows = client.query(FOREIGN_KEYS, &[]).await?;
        Ok(rows
            .iter()
            .map(|row| ForeignKey::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .filter(|fk| fk.table != fk.referenced)
            .collect())
    }

    async fn export_query(&self, query: &str) -> Result<QueryResult> {
        let client = self.session.client().await;
        let messages = client.simple_query(query).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header_written = false;
        let mut row_count = 0;

        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(columns) if !header_written => {
                    writer.write_record(columns.iter().map(|c| c.name()))?;
                    header_written = true;
                }
                SimpleQueryMessage::Row(row) => {
                    if !header_written {
                        writer.write_record(row.columns().iter().map(|c| c.name()))?;
                        header_written = true;
                    }
                    writer.write_record((0..row.len()).map(|i| row.get(i).unwrap_or("")))?;
                    row_count += 1;

                    if row_count % 1000 == 0 {
                        debug!("Writing {row_count} rows...");
                    }
                }
                _ => {}
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| PostgresError::Io(e.into_error()))?;
        Ok(QueryResult { bytes, row_count })
    }

    async fn import_rows(&self, table: &str, csv: &[u8]) -> Result<u64> {
        let (sql, rows) = insert_statements(table, csv)?;
        if rows == 0 {
            return Ok(0);
        }

        // One simple-query batch runs as a single implicit transaction.
        let client = self.session.client().await;
        client.batch_execute(&sql).await?;
        info!("Inserted {rows} rows into {table}");
        Ok(rows)
    }

    async fn export_schema_ddl(&self, _schema: &str) -> Result<Vec<u8>> {
        Err(Self::unsupported("schema DDL export"))
    }

    async fn export_table_ddl(&self, _table: &str) -> Result<Vec<u8>> {
        Err(Self::unsupported("table DDL export"))
    }

    async fn execute_sql(&self, sql: &[u8]) -> Result<()> {
        let client = self.session.client().await;
        client.batch_execute(&String::from_utf8_lossy(sql)).await?;
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        let client = self.session.client().await;
        client
            .batch_execute(&format!("DELETE FROM {}", quote_qualified(table)))
            .await?;
        Ok(())
    }

    async fn reset_database(&self) -> Result<()> {
        Err(Self::unsupported("database reset"))
    }

    async fn collect_table_sequences(&self) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(BTreeMap::new())
    }

    async fn collect_sequence_value(&self, _sequence: &str) -> Result<i64> {
        Err(Self::unsupported("sequence export"))
    }

    async fn restore_sequence_value(&self, _sequence: &str, _value: i64) -> Result<()> {
        Err(Self::unsupported("sequence restore"))
    }
}
