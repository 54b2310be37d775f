use crate::{StorageError, StorageObject, StorageProvider};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory object store, handy for tests and for controlling modification times.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    objects: Arc<RwLock<BTreeMap<String, (Bytes, DateTime<Utc>)>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object with an explicit last-modified time.
    pub async fn put_object_at(&self, path: &str, data: Bytes, modified: DateTime<Utc>) {
        self.objects
            .write()
            .await
            .insert(path.to_string(), (data, modified));
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<StorageObject>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (data, modified))| StorageObject {
                key: key.clone(),
                size: data.len() as u64,
                last_modified: *modified,
            })
            .collect())
    }

    async fn put_object(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        self.put_object_at(path, data, Utc::now()).await;
        Ok(())
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, StorageError> {
        self.objects
            .read()
            .await
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(format!("Object {path} not found")))
    }
}
