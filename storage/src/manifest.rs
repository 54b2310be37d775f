//! Transaction-scoped ledger of completed backup/restore actions.
//!
//! Rows are keyed by a transaction id: opening a manifest picks `max + 1`, and a
//! caller may override it to resume an earlier run. Tables already recorded
//! under the active id are skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestAction {
    Backup,
    Restore,
}

impl ManifestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestAction::Backup => "backup",
            ManifestAction::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub transaction: i32,
    pub action: ManifestAction,
    pub table: String,
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable storage for manifest rows.
#[async_trait]
pub trait ManifestLedger: Send + Sync {
    async fn max_transaction(&self) -> Result<Option<i32>, StorageError>;

    async fn contains(&self, transaction: i32, table: &str) -> Result<bool, StorageError>;

    /// Persists one row; must be committed before returning.
    async fn insert(&self, entry: &ManifestEntry) -> Result<(), StorageError>;
}

pub struct Manifest {
    ledger: Box<dyn ManifestLedger>,
    action: ManifestAction,
    transaction: i32,
}

impl Manifest {
    pub async fn open(
        ledger: Box<dyn ManifestLedger>,
        action: ManifestAction,
    ) -> Result<Self, StorageError> {
        let transaction = ledger.max_transaction().await?.map_or(1, |max| max + 1);
        debug!("Opened {} manifest at transaction {transaction}", action.as_str());
        Ok(Self {
            ledger,
            action,
            transaction,
        })
    }

    pub fn action(&self) -> ManifestAction {
        self.action
    }

    pub fn transaction_id(&self) -> i32 {
        self.transaction
    }

    pub fn set_transaction_id(&mut self, transaction: i32) {
        self.transaction = transaction;
    }

    pub async fn contains(&self, table: &str) -> Result<bool, StorageError> {
        self.ledger.contains(self.transaction, table).await
    }

    pub async fn record(&self, table: &str, file_path: &str) -> Result<(), StorageError> {
        let entry = ManifestEntry {
            transaction: self.transaction,
            action: self.action,
            table: table.to_string(),
            file_path: file_path.to_string(),
            timestamp: Utc::now(),
        };
        self.ledger.insert(&entry).await
    }
}

/// A process-local ledger; clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    entries: Arc<Mutex<Vec<ManifestEntry>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ManifestEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl ManifestLedger for MemoryLedger {
    async fn max_transaction(&self) -> Result<Option<i32>, StorageError> {
        Ok(self.entries.lock().await.iter().map(|e| e.transaction).max())
    }

    async fn contains(&self, transaction: i32, table: &str) -> Result<bool, StorageError> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .any(|e| e.transaction == transaction && e.table == table))
    }

    async fn insert(&self, entry: &ManifestEntry) -> Result<(), StorageError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}
