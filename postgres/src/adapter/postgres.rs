use async_trait::async_trait;
use bytes::Bytes;
use futures::{pin_mut, SinkExt, TryStreamExt};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{count_rows, split_header, Adapter, QueryResult};
use crate::plan::ForeignKey;
use crate::session::{open, quote_ident, quote_qualified};
use crate::wrapper::{clean_sql, PgDump, PgDumpOptions};
use crate::{Result, Session};

const LIST_TABLES: &str = "
    SELECT n.nspname || '.' || c.relname
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'p')
      AND NOT c.relispartition
      AND n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND n.nspname NOT LIKE 'pg_toast%'
    ORDER BY n.nspname, c.relname";

const FOREIGN_KEYS: &str = "
    SELECT DISTINCT
        cn.nspname || '.' || c.relname,
        pn.nspname || '.' || p.relname
    FROM pg_constraint k
    JOIN pg_class c ON c.oid = k.conrelid
    JOIN pg_namespace cn ON cn.oid = c.relnamespace
    JOIN pg_class p ON p.oid = k.confrelid
    JOIN pg_namespace pn ON pn.oid = p.relnamespace
    WHERE k.contype = 'f'
      AND k.conrelid <> k.confrelid";

const TABLE_SEQUENCES: &str = "
    SELECT
        seq_ns.nspname || '.' || seq.relname,
        tab_ns.nspname || '.' || tab.relname
    FROM pg_class seq
    JOIN pg_namespace seq_ns ON seq_ns.oid = seq.relnamespace
    JOIN pg_depend d ON d.objid = seq.oid AND d.deptype IN ('a', 'i')
    JOIN pg_class tab ON tab.oid = d.refobjid
    JOIN pg_namespace tab_ns ON tab_ns.oid = tab.relnamespace
    WHERE seq.relkind = 'S'
    ORDER BY 2, 1";

/// Native Postgres behaviour: COPY for data, pg_dump for DDL.
pub struct PostgresAdapter {
    session: Arc<Session>,
}

impl PostgresAdapter {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn pg_dump(&self, configure: impl FnOnce(&mut PgDumpOptions)) -> Result<Vec<u8>> {
        PgDump::check_availability()?;
        let mut options = PgDumpOptions::from_config(self.session.config());
        configure(&mut options);
        PgDump::run(&options).await
    }
}

/// Makes `CREATE SCHEMA x;` safe to replay into a database that has the schema.
fn create_schema_if_not_exists(sql: &[u8], schema: &str) -> Vec<u8> {
    let pattern = format!(
        r"CREATE SCHEMA ({}|{});",
        regex::escape(schema),
        regex::escape(&quote_ident(schema))
    );
    match regex::bytes::Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(sql, &b"CREATE SCHEMA IF NOT EXISTS $1;"[..])
            .into_owned(),
        Err(e) => {
            warn!("Could not rewrite CREATE SCHEMA for {schema}: {e}");
            sql.to_vec()
        }
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn default_schema(&self) -> Result<String> {
        let client = self.session.client().await;
        let row = client.query_one("SELECT current_schema()", &[]).await?;
        let schema: Option<String> = row.get(0);
        Ok(schema.unwrap_or_else(|| "public".to_string()))
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
            .collect())
    }

    async fn export_query(&self, query: &str) -> Result<QueryResult> {
        let copy = format!("COPY ({query}) TO STDOUT WITH (FORMAT csv, HEADER true)");
        debug!("{copy}");

        let client = self.session.client().await;
        let stream = client.copy_out(copy.as_str()).await?;
        pin_mut!(stream);

        let mut bytes = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            bytes.extend_from_slice(&chunk);
        }

        let row_count = count_rows(&bytes)?;
        Ok(QueryResult { bytes, row_count })
    }

    async fn import_rows(&self, table: &str, csv: &[u8]) -> Result<u64> {
        let (header, body) = split_header(csv)?;
        if header.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = header.iter().map(|c| quote_ident(c)).collect();
        let copy = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv)",
            quote_qualified(table),
            columns.join(", ")
        );
        debug!("{copy}");

        let client = self.session.client().await;
        let sink = client.copy_in::<_, Bytes>(copy.as_str()).await?;
        pin_mut!(sink);
        sink.send(Bytes::copy_from_slice(body)).await?;
        let rows = sink.as_mut().finish().await?;
        Ok(rows)
    }

    async fn export_schema_ddl(&self, schema: &str) -> Result<Vec<u8>> {
        let sql = self
            .pg_dump(|options| {
                options.schemas.push(schema.to_string());
                options.exclude_tables.push(format!("{schema}.*"));
            })
            .await?;
        Ok(create_schema_if_not_exists(&sql, schema))
    }

    async fn export_table_ddl(&self, table: &str) -> Result<Vec<u8>> {
        self.pg_dump(|options| options.tables.push(quote_qualified(table)))
            .await
    }

    async fn execute_sql(&self, sql: &[u8]) -> Result<()> {
        let cleaned = clean_sql(sql);
        let text = String::from_utf8_lossy(&cleaned);
        if text.trim().is_empty() {
            return Ok(());
        }
        let client = self.session.client().await;
        client.batch_execute(&text).await?;
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        let client = self.session.client().await;
        client
            .batch_execute(&format!("TRUNCATE TABLE {} CASCADE", quote_qualified(table)))
            .await?;
        Ok(())
    }

    async fn reset_database(&self) -> Result<()> {
        let database = self.session.database()?.to_string();

        // template1 is always there to connect to; template0 is the pristine template.
        let mut maintenance = self.session.config().clone();
        maintenance.dbname("template1");
        let client = open(&maintenance).await?;

        client
            .execute(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = $1 AND pid <> pg_backend_pid()",
                &[&database],
            )
            .await?;
        client
            .batch_execute(&format!("DROP DATABASE {}", quote_ident(&database)))
            .await?;
        client
            .batch_execute(&format!(
                "CREATE DATABASE {} TEMPLATE template0",
                quote_ident(&database)
            ))
            .await?;
        info!("Recreated database {database}");

        self.session.reconnect().await
    }

    async fn collect_table_sequences(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let client = self.session.client().await;
        let rows = client.query(TABLE_SEQUENCES, &[]).await?;

        let mut sequences: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rows {
            sequences.entry(row.get(1)).or_default().push(row.get(0));
        }
        Ok(sequences)
    }

    async fn collect_sequence_value(&self, sequence: &str) -> Result<i64> {
        let client = self.session.client().await;
        let row = client
            .query_one(
                &format!("SELECT last_value FROM {}", quote_qualified(sequence)),
                &[],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn restore_sequence_value(&self, sequence: &str, value: i64) -> Result<()> {
        let client = self.session.client().await;
        client
            .query_one(
                "SELECT setval($1::text::regclass, $2::bigint)",
                &[&quote_qualified(sequence), &value],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_schema_becomes_idempotent() {
        let sql = b"CREATE SCHEMA sales;\nCREATE SCHEMA salesforce;\nCREATE SCHEMA \"sales\";";
        let rewritten = String::from_utf8(create_schema_if_not_exists(sql, "sales")).unwrap();
        assert_eq!(
            rewritten,
            "CREATE SCHEMA IF NOT EXISTS sales;\nCREATE SCHEMA salesforce;\nCREATE SCHEMA IF NOT EXISTS \"sales\";"
        );
    }
}
