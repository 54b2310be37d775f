use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents an object in storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    /// Full path of the object: a local path or an `s3://bucket/key` URI
    pub key: String,
    /// Size of the object in bytes
    pub size: u64,
    /// Last modified time reported by the backend
    pub last_modified: DateTime<Utc>,
}

impl StorageObject {
    /// The final path segment.
    pub fn file_name(&self) -> &str {
        self.key.rsplit_once('/').map(|(_, name)| name).unwrap_or(&self.key)
    }

    /// Everything before the final path segment.
    pub fn parent(&self) -> &str {
        self.key.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }
}

/// The kinds of artifact a run writes; each has a fixed extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Ddl,
    Sequences,
    Data,
    Manifest,
}

impl FileKind {
    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Ddl => "sql",
            FileKind::Sequences => "json",
            FileKind::Data => "csv",
            FileKind::Manifest => "json",
        }
    }
}

/// Describes the artifact being written or read.
#[derive(Debug, Clone, Copy)]
pub struct FileSpec<'a> {
    pub kind: FileKind,
    /// Table or schema the artifact belongs to; used for stats and the manifest.
    pub name: Option<&'a str>,
    pub compression: Option<&'a str>,
    /// Row count of a data artifact, for stats.
    pub rows: Option<u64>,
}

impl<'a> FileSpec<'a> {
    pub fn new(kind: FileKind) -> Self {
        Self {
            kind,
            name: None,
            compression: None,
            rows: None,
        }
    }

    pub fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn compression(mut self, compression: Option<&'a str>) -> Self {
        self.compression = compression;
        self
    }

    pub fn rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }
}

/// A stored artifact: the path it was read from and its decompressed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileObject {
    pub path: String,
    pub content: Vec<u8>,
}

/// Per-table record of what a run touched, for end-of-run reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub name: String,
    pub ddl: bool,
    pub sequences: bool,
    pub data: bool,
    pub rows: Option<u64>,
}

impl TableStats {
    pub fn note(&mut self, kind: FileKind) {
        match kind {
            FileKind::Ddl => self.ddl = true,
            FileKind::Sequences => self.sequences = true,
            FileKind::Data => self.data = true,
            FileKind::Manifest => {}
        }
    }
}
