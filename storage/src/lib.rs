//! Artifact storage for pgstash.
//!
//! Backups are plain files (CSV data, SQL DDL, JSON sequence values) written under
//! location templates on local disk or S3-compatible object stores. This crate
//! provides the providers, compression, selection of the artifact to restore and
//! the transaction-scoped manifest.

mod backend;
pub mod compression;
mod error;
pub mod manifest;
pub mod providers;
pub mod selection;
mod types;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use manifest::{Manifest, ManifestAction, ManifestEntry, ManifestLedger, MemoryLedger};
pub use providers::*;
pub use selection::SelectionStrategy;
pub use types::*;

use async_trait::async_trait;
use bytes::Bytes;

/// Core storage provider interface; paths are local paths or `s3://` URIs.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    /// Returns the name of the storage provider.
    fn name(&self) -> &str;

    /// Lists every object whose full path starts with `prefix`.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StorageObject>, StorageError>;

    /// Writes an object, creating intermediate directories where needed.
    async fn put_object(&self, path: &str, data: Bytes) -> Result<(), StorageError>;

    /// Reads a whole object.
    async fn get_object(&self, path: &str) -> Result<Bytes, StorageError>;
}

/// Factory for creating storage providers.
pub struct StorageProviderFactory;

impl StorageProviderFactory {
    pub async fn create_s3_provider(
        options: S3Options,
    ) -> Result<Box<dyn StorageProvider>, StorageError> {
        let provider = providers::aws::S3Provider::new(options).await?;
        Ok(Box::new(provider))
    }
}
