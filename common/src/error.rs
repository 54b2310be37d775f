use thiserror::Error;

/// Errors raised while loading or resolving configuration.
///
/// These are always surfaced to the caller and never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No connection configured: set `url` or `connection` for the {0} section")]
    MissingConnection(String),

    #[error("Connection `{0}` does not name a configured connection or look like a database url")]
    UnknownConnection(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Conflicting options: {0}")]
    ConflictingOptions(String),

    #[error("Cannot combine locations in different buckets: s3://{left} and s3://{right}")]
    BucketMismatch { left: String, right: String },

    #[error("Invalid value for `{key}`: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse {source_name}: {message}")]
    Parse { source_name: String, message: String },

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl ConfigError {
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ConfigError::Parse {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}
