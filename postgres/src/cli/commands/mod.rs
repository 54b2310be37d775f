pub mod backup;
pub mod config;
pub mod restore;

use common::{TableConfig, TableParentConfig};
use log::{debug, info};
use std::io::{self, Write};
use std::sync::Arc;
use storage::{Manifest, ManifestAction, StorageBackend};

use crate::adapter::{get_adapter, Adapter};
use crate::cli::GlobalArgs;
use crate::{PgLedger, Result, RunReport, Session};

const DEFAULT_ADAPTER: &str = "postgres";

/// Everything a backup or restore run needs, built from one config section.
pub struct RunContext {
    pub adapter: Box<dyn Adapter>,
    pub storage: StorageBackend,
}

impl RunContext {
    pub async fn connect<T: TableConfig>(
        config: &TableParentConfig<T>,
        global: &GlobalArgs,
        action: ManifestAction,
        transaction_id: Option<i32>,
    ) -> Result<Self> {
        let connection = config.resolve_connection()?;
        let session = Arc::new(Session::connect(&connection.dsn()).await?);

        let dialect = config
            .adapter
            .clone()
            .or_else(|| connection.dialect())
            .unwrap_or_else(|| DEFAULT_ADAPTER.to_string());
        let adapter = get_adapter(session.clone(), &dialect);
        debug!("Using the {} adapter", adapter.name());

        let manifest = match &config.manifest {
            Some(table) => {
                let mut manifest =
                    Manifest::open(Box::new(PgLedger::new(session.clone(), table)), action).await?;
                if let Some(id) = transaction_id {
                    manifest.set_transaction_id(id);
                }
                info!(
                    "Using {} manifest `{table}` at transaction {}",
                    action.as_str(),
                    manifest.transaction_id()
                );
                Some(manifest)
            }
            None => None,
        };

        let storage = StorageBackend::from_config(config)
            .await?
            .with_manifest(manifest)
            .record_stats(global.stats)
            .perform_writes(!global.dry_run);

        if global.dry_run {
            info!("Dry run: nothing will be written");
        }

        Ok(Self {
            adapter,
            storage,
        })
    }

    /// Reports on a finished run: the stats table when `--stats` was given,
    /// then the summary. The stats are printed even when the run failed.
    pub fn finish(&self, global: &GlobalArgs, outcome: Result<RunReport>) -> Result<RunReport> {
        conclude(&self.storage, global, outcome, &mut io::stdout())
    }
}

fn conclude(
    storage: &StorageBackend,
    global: &GlobalArgs,
    outcome: Result<RunReport>,
    out: &mut impl Write,
) -> Result<RunReport> {
    if global.stats {
        writeln!(out, "{}", storage.render_stats())?;
    }
    let report = outcome?;
    report.log_summary();
    Ok(report)
}
