use clap::Args;
use common::{ConfigError, RootConfig};
use log::info;
use storage::ManifestAction;

use super::RunContext;
use crate::cli::GlobalArgs;
use crate::{backup_all, Result, RunReport};

#[derive(Debug, Args)]
pub struct Backup {
    /// Manifest transaction id to record under, e.g. to resume an interrupted backup
    #[clap(long)]
    pub backup_id: Option<i32>,
}

impl Backup {
    pub async fn run(self, root: &RootConfig, global: &GlobalArgs) -> Result<RunReport> {
        let config = root
            .backup
            .as_ref()
            .ok_or_else(|| ConfigError::invalid("backup", "no backup section configured"))?;

        let mut context =
            RunContext::connect(config, global, ManifestAction::Backup, self.backup_id).await?;

        info!("Performing backup!");
        let outcome = backup_all(config, context.adapter.as_ref(), &mut context.storage).await;

        context.finish(global, outcome)
    }
}
