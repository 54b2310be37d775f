use chrono::NaiveDateTime;
use std::str::FromStr;

use crate::{StorageError, StorageObject};

/// `strftime` layout of the timestamp every artifact file is named after.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Picks one artifact among the candidates found at a restore location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Newest timestamp encoded in the file name.
    UseLatestFilename,
    /// Newest last-modified time reported by the backend.
    UseLatestMetadata,
}

impl FromStr for SelectionStrategy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use_latest_filename" => Ok(SelectionStrategy::UseLatestFilename),
            "use_latest_metadata" => Ok(SelectionStrategy::UseLatestMetadata),
            other => Err(StorageError::Configuration(format!(
                "Unknown selection strategy `{other}`"
            ))),
        }
    }
}

/// Parses `<timestamp>.<filetype>` back into the timestamp it was written with.
pub fn parse_filename(file_name: &str, filetype: &str) -> Option<NaiveDateTime> {
    let stem = file_name.strip_suffix(filetype)?.strip_suffix('.')?;
    NaiveDateTime::parse_from_str(stem, DATETIME_FORMAT).ok()
}

impl SelectionStrategy {
    /// Returns `None` when there are no usable candidates.
    pub fn select(&self, candidates: Vec<StorageObject>, filetype: &str) -> Option<StorageObject> {
        match self {
            SelectionStrategy::UseLatestFilename => candidates
                .into_iter()
                .filter_map(|object| {
                    parse_filename(object.file_name(), filetype).map(|ts| (ts, object))
                })
                .max_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(_, object)| object),
            SelectionStrategy::UseLatestMetadata => candidates
                .into_iter()
                .filter(|object| {
                    object
                        .file_name()
                        .strip_suffix(filetype)
                        .is_some_and(|stem| stem.ends_with('.'))
                })
                .max_by(|a, b| {
                    a.last_modified
                        .cmp(&b.last_modified)
                        .then_with(|| a.key.cmp(&b.key))
                }),
        }
    }
}
