//! Restore runs: DDL first, then sequence positions, truncation and table data.

use common::paths::join_paths;
use common::{RestoreConfig, RestoreTableConfig, TableConfig};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use storage::{FileKind, FileSpec, SelectionStrategy, StorageBackend};

use crate::adapter::{count_rows, Adapter};
use crate::failures::{capture_failures, RunReport};
use crate::plan::{expand_table_ops, materialize_dependencies, schema_ops, TableOp};
use crate::Result;

type RestoreOp = TableOp<RestoreTableConfig>;

/// Restores every table `config` names from its most recent backup.
///
/// With `ddl.clean` the target database is dropped and recreated before
/// anything is restored. Nothing touches the database when the storage
/// backend does not perform writes.
pub async fn restore_all(
    config: &RestoreConfig,
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
) -> Result<RunReport> {
    let mut report = RunReport::default();
    let default_schema = adapter.default_schema().await?;

    if config.ddl.enabled {
        if config.ddl.clean && storage.performs_writes() {
            info!("Cleaning database");
            adapter.reset_database().await?;
        }
        restore_ddl(config, &default_schema, adapter, storage, &mut report).await?;
    }

    let existing_tables = adapter.collect_existing_tables().await?;
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
    info!("Restoring {} table(s)", ops.len());

    restore_sequences(&ops, adapter, storage, &mut report).await?;
    truncate_tables(&ops, adapter, storage, &mut report).await?;
    restore_tables(&ops, adapter, storage, &mut report).await?;

    Ok(report)
}

/// Recreates schemas and tables from the DDL written by the most recent backup.
///
/// The table list comes from the DDL manifest, so tables that do not exist yet
/// can still be matched by the configured patterns.
pub async fn restore_ddl(
    config: &RestoreConfig,
    default_schema: &str,
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
    report: &mut RunReport,
) -> Result<()> {
    let ddl_location = &config.ddl.location;
    let strategy: SelectionStrategy = config.ddl.strategy.parse()?;

    let Some(manifest) = storage
        .get_file_content(ddl_location, strategy, FileSpec::new(FileKind::Manifest))
        .await?
    else {
        warn!("Found no DDL manifest at {ddl_location}, skipping DDL restore");
        return Ok(());
    };
    let backed_up: Vec<String> = serde_json::from_slice(&manifest.content)?;
    debug!("Using DDL manifest {} ({} tables)", manifest.path, backed_up.len());

    let ops = expand_table_ops(
        &config.tables,
        &backed_up,
        default_schema,
        storage,
        false,
        report,
    )
    .await?;

    for schema in schema_ops(&ops) {
        let location = join_paths([ddl_location.as_str(), schema.name.as_str()])?;
        let mut missing = false;

        capture_failures(schema.config.strict, &schema.name, report, async {
            let strategy: SelectionStrategy = schema.config.strategy.parse()?;
            let spec = FileSpec::new(FileKind::Ddl).named(&schema.name);
            let Some(file) = storage.get_file_content(&location, strategy, spec).await? else {
                missing = true;
                return Ok(());
            };
            if storage.performs_writes() {
                adapter.execute_sql(&file.content).await?;
            }
            Ok(())
        })
        .await?;

        if missing {
            warn!("No schema DDL found for {} at {location}", schema.name);
        }
    }
    info!("Finished restoring schema DDL");

    let mut restored: Vec<&str> = Vec::new();
    for op in ops.iter().filter(|op| op.config.ddl) {
        if restored.contains(&op.full_name.as_str()) {
            continue;
        }
        let location = join_paths([ddl_location.as_str(), op.full_name.as_str()])?;
        let mut missing = false;

        capture_failures(op.config.strict, &op.full_name, report, async {
            info!("Restoring DDL: {}", op.full_name);
            let strategy: SelectionStrategy = op.config.strategy.parse()?;
            let spec = FileSpec::new(FileKind::Ddl).named(&op.full_name);
            let Some(file) = storage.get_file_content(&location, strategy, spec).await? else {
                missing = true;
                return Ok(());
            };
            if storage.performs_writes() {
                adapter.execute_sql(&file.content).await?;
            }
            Ok(())
        })
        .await?;

        if missing {
            warn!("No DDL found for {} at {location}", op.full_name);
            report.missing(op.full_name.clone());
        }
        restored.push(&op.full_name);
    }
    info!("Finished restoring DDL");

    Ok(())
}

/// Moves every sequence a table owns back to its backed-up position.
pub async fn restore_sequences(
    ops: &[RestoreOp],
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
    report: &mut RunReport,
) -> Result<()> {
    for op in ops.iter().filter(|op| op.config.sequences) {
        let location = join_paths([op.location().as_str(), "sequences"])?;

        capture_failures(op.config.strict, &op.full_name, report, async {
            let strategy: SelectionStrategy = op.config.strategy.parse()?;
            let spec = FileSpec::new(FileKind::Sequences).named(&op.full_name);
            let Some(file) = storage.get_file_content(&location, strategy, spec).await? else {
                debug!("No sequences found for {}", op.full_name);
                return Ok(());
            };

            info!("Restoring sequence positions: {}", op.full_name);
            let values: BTreeMap<String, i64> = serde_json::from_slice(&file.content)?;
            if storage.performs_writes() {
                for (sequence, value) in &values {
                    adapter.restore_sequence_value(sequence, *value).await?;
                }
            }
            Ok(())
        })
        .await?;
    }
    info!("Finished restoring sequence positions");
    Ok(())
}

/// Truncates tables configured with `truncate`, children before parents.
pub async fn truncate_tables(
    ops: &[RestoreOp],
    adapter: &dyn Adapter,
    storage: &StorageBackend,
    report: &mut RunReport,
) -> Result<()> {
    let mut truncated: Vec<&str> = Vec::new();
    for op in ops.iter().rev().filter(|op| op.config.truncate) {
        if truncated.contains(&op.full_name.as_str()) {
            continue;
        }
        truncated.push(&op.full_name);

        capture_failures(op.config.strict, &op.full_name, report, async {
            info!("Truncating {}", op.full_name);
            if storage.performs_writes() {
                adapter.truncate_table(&op.full_name).await?;
            }
            Ok(())
        })
        .await?;
    }
    Ok(())
}

/// Loads each table's most recent CSV backup, parents before children.
pub async fn restore_tables(
    ops: &[RestoreOp],
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
    report: &mut RunReport,
) -> Result<()> {
    for op in ops.iter().filter(|op| op.config.data) {
        let mut missing = false;
        capture_failures(
            op.config.strict,
            &op.full_name,
            report,
            restore_table(op, adapter, storage, &mut missing),
        )
        .await?;

        if missing {
            warn!("Found no backup for {} at {}", op.full_name, op.location());
            report.missing(op.full_name.clone());
        }
    }
    info!("Finished restoring tables");
    Ok(())
}

async fn restore_table(
    op: &RestoreOp,
    adapter: &dyn Adapter,
    storage: &mut StorageBackend,
    missing: &mut bool,
) -> Result<()> {
    let strategy: SelectionStrategy = op.config.strategy.parse()?;
    let spec = FileSpec::new(FileKind::Data)
        .named(&op.full_name)
        .compression(op.config.compression.as_deref());

    let Some(file) = storage.get_file_content(&op.location(), strategy, spec).await? else {
        *missing = true;
        return Ok(());
    };

    info!("Restoring table: {}", op.full_name);
    let rows = if storage.performs_writes() {
        adapter.import_rows(&op.full_name, &file.content).await?
    } else {
        count_rows(&file.content)?
    };

    storage.complete_restore(&op.full_name, &file, rows).await;
    debug!("Restored {rows} rows into {} from {}", op.full_name, file.path);
    Ok(())
}
