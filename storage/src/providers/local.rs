use crate::{StorageError, StorageObject, StorageProvider};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, error};
use std::io::ErrorKind;
use std::path::Path;
use walkdir::WalkDir;

/// Stores artifacts on the local filesystem; paths are used as given.
#[derive(Debug, Clone, Default)]
pub struct LocalProvider;

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }
}

fn walk(root: &str) -> Result<Vec<StorageObject>, StorageError> {
    let root_path = Path::new(if root.is_empty() { "." } else { root });
    if !root_path.exists() {
        return Ok(Vec::new());
    }

    let mut objects = Vec::new();
    for entry in WalkDir::new(root_path).follow_links(true) {
        let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| StorageError::Io(e.into()))?;
        let path = entry.path().to_string_lossy();
        let key = if root.is_empty() {
            path.trim_start_matches("./").to_string()
        } else {
            path.into_owned()
        };

        objects.push(StorageObject {
            key,
            size: metadata.len(),
            last_modified: DateTime::<Utc>::from(metadata.modified()?),
        });
    }

    Ok(objects)
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<StorageObject>, StorageError> {
        let root = prefix.to_string();
        tokio::task::spawn_blocking(move || walk(&root)).await?
    }

    async fn put_object(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create directory {}: {}", parent.display(), e);
                StorageError::Io(e)
            })?;
        }
        tokio::fs::write(path, &data).await?;
        debug!("Wrote {} bytes to {path}", data.len());
        Ok(())
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, StorageError> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("File {path} not found")))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn lists_nested_files_with_full_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let provider = LocalProvider::new();

        provider
            .put_object(&format!("{root}/a/b/one.csv"), Bytes::from_static(b"1"))
            .await
            .unwrap();
        provider
            .put_object(&format!("{root}/a/two.csv"), Bytes::from_static(b"22"))
            .await
            .unwrap();

        let mut keys: Vec<String> = provider
            .list_objects(&format!("{root}/a"))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec![format!("{root}/a/b/one.csv"), format!("{root}/a/two.csv")]);
    }

    #[tokio::test]
    async fn missing_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let provider = LocalProvider::new();

        assert!(provider.list_objects(&format!("{root}/nope")).await.unwrap().is_empty());
        assert!(matches!(
            provider.get_object(&format!("{root}/nope.csv")).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
