use std::fmt;

/// Error type for storage operations
#[derive(Debug)]
pub enum StorageError {
    /// AWS SDK error
    Aws(String),
    /// Configuration error
    Configuration(String),
    /// Compression or decompression failed
    Compression(String),
    /// I/O error
    Io(std::io::Error),
    /// Manifest ledger error
    Manifest(String),
    /// Object not found
    NotFound(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// Unexpected error
    Unexpected(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Aws(msg) => write!(f, "AWS SDK error: {}", msg),
            StorageError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            StorageError::Compression(msg) => write!(f, "Compression error: {}", msg),
            StorageError::Io(err) => write!(f, "I/O error: {}", err),
            StorageError::Manifest(msg) => write!(f, "Manifest error: {}", msg),
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::Unexpected(msg) => write!(f, "Unexpected error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<common::ConfigError> for StorageError {
    fn from(err: common::ConfigError) -> Self {
        StorageError::Configuration(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Unexpected(err.to_string())
    }
}
