use async_trait::async_trait;
use std::sync::Arc;
use storage::{ManifestEntry, ManifestLedger, StorageError};

use crate::session::quote_qualified;
use crate::Session;

/// Manifest rows kept in a table of the database being backed up or restored.
///
/// The table is created by the operator with the columns `transaction`,
/// `action`, `table`, `file_path` and `timestamp`.
pub struct PgLedger {
    session: Arc<Session>,
    table: String,
}

impl PgLedger {
    pub fn new(session: Arc<Session>, table: &str) -> Self {
        Self {
            session,
            table: quote_qualified(table),
        }
    }
}

fn ledger_error(e: tokio_postgres::Error) -> StorageError {
    StorageError::Manifest(e.to_string())
}

#[async_trait]
impl ManifestLedger for PgLedger {
    async fn max_transaction(&self) -> Result<Option<i32>, StorageError> {
        let client = self.session.client().await;
        let row = client
            .query_one(
                &format!("SELECT max(\"transaction\")::int4 FROM {}", self.table),
                &[],
            )
            .await
            .map_err(ledger_error)?;
        Ok(row.get(0))
    }

    async fn contains(&self, transaction: i32, table: &str) -> Result<bool, StorageError> {
        let client = self.session.client().await;
        let row = client
            .query_opt(
                &format!(
                    "SELECT 1 FROM {} WHERE \"transaction\" = $1::int4 AND \"table\" = $2::text LIMIT 1",
                    self.table
                ),
                &[&transaction, &table],
            )
            .await
            .map_err(ledger_error)?;
        Ok(row.is_some())
    }

    async fn insert(&self, entry: &ManifestEntry) -> Result<(), StorageError> {
        // Outside an explicit transaction each statement commits on its own.
        let client = self.session.client().await;
        client
            .execute(
                &format!(
                    "INSERT INTO {} (\"transaction\", \"action\", \"table\", \"file_path\", \"timestamp\") \
                     VALUES ($1::int4, $2::text, $3::text, $4::text, $5::timestamptz)",
                    self.table
                ),
                &[
                    &entry.transaction,
                    &entry.action.as_str(),
                    &entry.table,
                    &entry.file_path,
                    &entry.timestamp,
                ],
            )
            .await
            .map_err(ledger_error)?;
        Ok(())
    }
}
