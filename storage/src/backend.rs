use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::matching::Glob;
use common::paths::{is_s3_path, join_paths};
use common::{TableConfig, TableParentConfig};
use log::{debug, trace, warn};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::compression::codec;
use crate::selection::DATETIME_FORMAT;
use crate::{
    FileKind, FileObject, FileSpec, LocalProvider, Manifest, S3Options, SelectionStrategy,
    StorageError, StorageObject, StorageProvider, StorageProviderFactory, TableStats,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads and writes backup artifacts, choosing the provider from the path.
///
/// Every write in one run shares the same timestamp, which names the file
/// (`<timestamp>.<ext>[.gz]`) and fills the `{timestamp}`/`{date}`
/// placeholders of the location template.
pub struct StorageBackend {
    local: Arc<dyn StorageProvider>,
    s3: Option<Arc<dyn StorageProvider>>,
    timestamp: DateTime<Utc>,
    manifest: Option<Manifest>,
    stats: Vec<TableStats>,
    record_stats: bool,
    perform_writes: bool,
}

impl StorageBackend {
    pub fn new(local: Arc<dyn StorageProvider>) -> Self {
        Self {
            local,
            s3: None,
            timestamp: Utc::now(),
            manifest: None,
            stats: Vec::new(),
            record_stats: false,
            perform_writes: true,
        }
    }

    /// Local storage plus an S3 provider when any configured location needs one.
    pub async fn from_config<T: TableConfig>(
        config: &TableParentConfig<T>,
    ) -> Result<Self, StorageError> {
        let mut backend = Self::new(Arc::new(LocalProvider::new()));
        if config.uses_s3() {
            let options = config.s3.as_ref().map(S3Options::from).unwrap_or_default();
            let provider = StorageProviderFactory::create_s3_provider(options).await?;
            backend = backend.with_s3(Arc::from(provider));
        }
        Ok(backend)
    }

    pub fn with_s3(mut self, provider: Arc<dyn StorageProvider>) -> Self {
        self.s3 = Some(provider);
        self
    }

    pub fn with_manifest(mut self, manifest: Option<Manifest>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn record_stats(mut self, record_stats: bool) -> Self {
        self.record_stats = record_stats;
        self
    }

    /// With `false`, every read still happens but nothing is persisted.
    pub fn perform_writes(mut self, perform_writes: bool) -> Self {
        self.perform_writes = perform_writes;
        self
    }

    pub fn performs_writes(&self) -> bool {
        self.perform_writes
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// True when the active manifest transaction already covers `table`.
    pub async fn check_manifest(&self, table: &str) -> Result<bool, StorageError> {
        match &self.manifest {
            Some(manifest) => manifest.contains(table).await,
            None => Ok(false),
        }
    }

    fn provider_for(&self, path: &str) -> Result<&Arc<dyn StorageProvider>, StorageError> {
        if is_s3_path(path) {
            self.s3.as_ref().ok_or_else(|| {
                StorageError::Configuration(format!("No S3 storage configured for {path}"))
            })
        } else {
            Ok(&self.local)
        }
    }

    /// Fills `{timestamp}`, `{date}` and `{ext}`; without a timestamp they become wildcards.
    fn render(&self, template: &str, timestamp: Option<&DateTime<Utc>>, ext: &str) -> String {
        let (timestamp, date) = match timestamp {
            Some(ts) => (
                ts.format(DATETIME_FORMAT).to_string(),
                ts.format(DATE_FORMAT).to_string(),
            ),
            None => ("*".to_string(), "*".to_string()),
        };
        template
            .replace("{timestamp}", &timestamp)
            .replace("{date}", &date)
            .replace("{ext}", ext)
    }

    /// Lists files sitting directly in any directory matching `pattern`.
    async fn candidates(&self, pattern: &str) -> Result<Vec<StorageObject>, StorageError> {
        let pattern = pattern.trim_end_matches('/');
        let provider = self.provider_for(pattern)?;

        let objects: Vec<StorageObject> = match pattern.find(['*', '?', '[']) {
            None => provider
                .list_objects(pattern)
                .await?
                .into_iter()
                .filter(|object| object.parent() == pattern)
                .collect(),
            Some(wildcard) => {
                let prefix = pattern[..wildcard]
                    .rsplit_once('/')
                    .map(|(prefix, _)| prefix)
                    .unwrap_or("");
                let glob = Glob::path(pattern)
                    .map_err(|e| StorageError::Configuration(format!("{pattern}: {e}")))?;
                provider
                    .list_objects(prefix)
                    .await?
                    .into_iter()
                    .filter(|object| glob.is_match(object.parent()))
                    .collect()
            }
        };

        trace!("Found {} candidates at {pattern}", objects.len());
        Ok(objects)
    }

    fn note(&mut self, name: &str, kind: FileKind, rows: Option<u64>) {
        if !self.record_stats {
            return;
        }
        let index = match self.stats.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.stats.push(TableStats {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.stats.len() - 1
            }
        };
        let stats = &mut self.stats[index];
        stats.note(kind);
        if rows.is_some() {
            stats.rows = rows;
        }
    }

    /// Writes `content` under the rendered `location` and returns the file path.
    ///
    /// Data artifacts written for a named table are recorded in the manifest.
    pub async fn write_buffer(
        &mut self,
        location: &str,
        content: Vec<u8>,
        spec: FileSpec<'_>,
    ) -> Result<String, StorageError> {
        let codec = codec(spec.compression)?;
        let extension = spec.kind.extension();
        let directory = self.render(location, Some(&self.timestamp), extension);
        let file_name = format!(
            "{}.{}",
            self.timestamp.format(DATETIME_FORMAT),
            codec.compose_filetype(extension)
        );
        let path = join_paths([directory.as_str(), file_name.as_str()])?;

        if let Some(name) = spec.name {
            self.note(name, spec.kind, spec.rows);
        }

        if !self.perform_writes {
            debug!("Dry run, not writing {path}");
            return Ok(path);
        }

        let compressed = codec.compress(content)?;
        self.provider_for(&path)?
            .put_object(&path, Bytes::from(compressed))
            .await?;

        if let (Some(name), FileKind::Data) = (spec.name, spec.kind) {
            self.record_manifest(name, &path).await;
        }

        Ok(path)
    }

    /// True when any file already exists at the rendered `location`.
    pub async fn path_exists(&self, location: &str) -> Result<bool, StorageError> {
        let pattern = self.render(location, None, "*");
        Ok(!self.candidates(&pattern).await?.is_empty())
    }

    /// Finds the artifact `strategy` selects at `location` and returns its decompressed content.
    ///
    /// `None` means there is nothing to restore there.
    pub async fn get_file_content(
        &mut self,
        location: &str,
        strategy: SelectionStrategy,
        spec: FileSpec<'_>,
    ) -> Result<Option<FileObject>, StorageError> {
        let codec = codec(spec.compression)?;
        let extension = spec.kind.extension();
        let pattern = self.render(location, None, extension);

        let candidates = self.candidates(&pattern).await?;
        let Some(object) = strategy.select(candidates, &codec.compose_filetype(extension)) else {
            return Ok(None);
        };
        debug!("Using {}", object.key);

        let raw = self.provider_for(&object.key)?.get_object(&object.key).await?;
        let content = codec.extract(raw.to_vec())?;

        if let Some(name) = spec.name {
            if spec.kind != FileKind::Data {
                self.note(name, spec.kind, None);
            }
        }

        Ok(Some(FileObject {
            path: object.key,
            content,
        }))
    }

    /// Marks a data artifact read with [`StorageBackend::get_file_content`] as restored.
    ///
    /// Call only once the rows are in the database; a failed import must not
    /// be recorded in the manifest.
    pub async fn complete_restore(&mut self, name: &str, file: &FileObject, rows: u64) {
        self.note(name, FileKind::Data, Some(rows));
        if self.perform_writes {
            self.record_manifest(name, &file.path).await;
        }
    }

    async fn record_manifest(&self, name: &str, path: &str) {
        if let Some(manifest) = &self.manifest {
            if let Err(e) = manifest.record(name, path).await {
                warn!("Failed to record {name} in the manifest: {e}");
            }
        }
    }

    pub fn stats(&self) -> &[TableStats] {
        &self.stats
    }

    /// A plain-text table of the recorded stats.
    pub fn render_stats(&self) -> String {
        let width = self
            .stats
            .iter()
            .map(|s| s.name.len())
            .chain(["Table".len()])
            .max()
            .unwrap_or(5);
        let check = |flag: bool| if flag { "x" } else { "" };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$}  {:^3}  {:^9}  {:^4}  {:>8}",
            "Table", "DDL", "Sequences", "Data", "Rows"
        );
        for stats in &self.stats {
            let rows = stats.rows.map(|r| r.to_string()).unwrap_or_default();
            let _ = writeln!(
                out,
                "{:>width$}  {:^3}  {:^9}  {:^4}  {:>8}",
                stats.name,
                check(stats.ddl),
                check(stats.sequences),
                check(stats.data),
                rows
            );
        }
        out
    }
}
