//! Backup runs: DDL, then sequence positions, then table data.

use common::paths::join_paths;
use common::{BackupConfig, BackupTableConfig, TableConfig};
use log::{debug, info};
use std::collections::BTreeMap;
use storage::{FileKind, FileSpec, StorageBackend};

use crate::adapter::Adapter;
use crate::failures::{capture_failures, RunReport};
use crate::plan::{expand_table_ops, materialize_dependencies, schema_ops, TableOp};
use crate::Result;

type BackupOp = TableOp<BackupTableConfig>;

/// Backs up every table `config` names.
///
/// Per-table failures are captured into the returned report unless the table is strict.
pub async fn backup_all(
    config: &BackupConfig,
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
) -> Result<RunReport> {
    let mut report = RunReport::default();

    let existing_tables = adapter.collect_existing_tables().await?;
    let default_schema = adapter.default_schema().await?;

    let ops = expand_table_ops(
        &config.tables,
        &existing_tables,
        &default_schema,
        storage,
        true,
        &mut report,
    )
    .await?;

    let ops = if ops.iter().any(|op| op.config.follow_foreign_keys) {
        let foreign_keys = adapter.collect_foreign_keys().await?;
        materialize_dependencies(ops, &foreign_keys, &existing_tables)?
    } else {
        ops
    };
    info!("Backing up {} table(s)", ops.len());

    if config.ddl.enabled {
        backup_ddl(config, &ops, adapter, storage, &mut report).await?;
    }
    backup_sequences(&ops, adapter, storage, &mut report).await?;
    backup_tables(&ops, adapter, storage, &mut report).await?;

    Ok(report)
}

/// Writes schema DDL, table DDL and a JSON list of the tables whose DDL was written.
pub async fn backup_ddl(
    config: &BackupConfig,
    ops: &[BackupOp],
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
    report: &mut RunReport,
) -> Result<()> {
    let ddl_location = &config.ddl.location;

    for schema in schema_ops(ops) {
        let location = join_paths([ddl_location.as_str(), schema.name.as_str()])?;
        capture_failures(schema.config.strict, &schema.name, report, async {
            let sql = adapter.export_schema_ddl(&schema.name).await?;
            let path = storage
                .write_buffer(&location, sql, FileSpec::new(FileKind::Ddl).named(&schema.name))
                .await?;
            debug!("Wrote {} schema DDL to {path}", schema.name);
            Ok(())
        })
        .await?;
    }
    info!("Finished backing up schema DDL");

    let mut table_names: Vec<String> = Vec::new();
    for op in ops.iter().filter(|op| op.config.ddl) {
        if table_names.contains(&op.full_name) {
            continue;
        }
        let location = join_paths([ddl_location.as_str(), op.full_name.as_str()])?;

        let mut written = false;
        capture_failures(op.config.strict, &op.full_name, report, async {
            info!("Backing up DDL: {}", op.full_name);
            let sql = adapter.export_table_ddl(&op.full_name).await?;
            let path = storage
                .write_buffer(&location, sql, FileSpec::new(FileKind::Ddl).named(&op.full_name))
                .await?;
            debug!("Wrote {} DDL to {path}", op.full_name);
            written = true;
            Ok(())
        })
        .await?;

        if written {
            table_names.push(op.full_name.clone());
        }
    }
    info!("Finished backing up DDL");

    // Restores read this list to know which tables to create.
    if !table_names.is_empty() {
        let manifest = serde_json::to_vec(&table_names)?;
        let path = storage
            .write_buffer(ddl_location, manifest, FileSpec::new(FileKind::Manifest))
            .await?;
        debug!("Wrote DDL manifest to {path}");
    }

    Ok(())
}

/// Writes the current value of every sequence owned by each table.
pub async fn backup_sequences(
    ops: &[BackupOp],
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
    report: &mut RunReport,
) -> Result<()> {
    if !ops.iter().any(|op| op.config.sequences) {
        return Ok(());
    }

    let table_sequences = adapter.collect_table_sequences().await?;
    if table_sequences.is_empty() {
        return Ok(());
    }

    for op in ops.iter().filter(|op| op.config.sequences) {
        let Some(sequences) = table_sequences.get(&op.full_name) else {
            continue;
        };
        let location = join_paths([op.location().as_str(), "sequences"])?;

        capture_failures(op.config.strict, &op.full_name, report, async {
            info!("Backing up sequence position: {}", op.full_name);
            let mut values: BTreeMap<&str, i64> = BTreeMap::new();
            for sequence in sequences {
                values.insert(sequence.as_str(), adapter.collect_sequence_value(sequence).await?);
            }

            let path = storage
                .write_buffer(
                    &location,
                    serde_json::to_vec(&values)?,
                    FileSpec::new(FileKind::Sequences).named(&op.full_name),
                )
                .await?;
            debug!("Wrote {} sequences to {path}", op.full_name);
            Ok(())
        })
        .await?;
    }
    info!("Finished backing up sequence positions");

    Ok(())
}

/// Exports each table's query as CSV to its location.
pub async fn backup_tables(
    ops: &[BackupOp],
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
    report: &mut RunReport,
) -> Result<()> {
    for op in ops.iter().filter(|op| op.config.data) {
        capture_failures(op.config.strict, &op.full_name, report, backup_table(op, adapter, storage))
            .await?;
    }
    info!("Finished backing up tables");
    Ok(())
}

async fn backup_table(op: &BackupOp, adapter: &dyn Adapter, storage: &mut StorageBackend) -> Result<()> {
    let location = op.location();

    if op.config.skip_if_exists && storage.path_exists(&location).await? {
        debug!("Skipping {} due to `skip_if_exists`", op.full_name);
        return Ok(());
    }

    info!("Backing up table: {}", op.full_name);
    let result = adapter.export_query(&op.query()).await?;

    let spec = FileSpec::new(FileKind::Data)
        .named(&op.full_name)
        .compression(op.config.compression.as_deref())
        .rows(result.row_count);
    let path = storage.write_buffer(&location, result.bytes, spec).await?;

    debug!("Wrote {} ({} rows) to {path}", op.full_name, result.row_count);
    Ok(())
}
