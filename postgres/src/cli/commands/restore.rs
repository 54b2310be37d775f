use clap::Args;
use common::{ConfigError, RootConfig};
use log::info;
use std::io::{self, BufRead, Write};
use storage::ManifestAction;

use super::RunContext;
use crate::cli::GlobalArgs;
use crate::{restore_all, PostgresError, Result, RunReport};

#[derive(Debug, Args)]
pub struct Restore {
    /// Manifest transaction id to record under, e.g. to resume an interrupted restore
    #[clap(long)]
    pub restore_id: Option<i32>,

    /// Drop and recreate the target database before restoring
    #[clap(long, overrides_with = "no_clean")]
    pub clean: bool,

    #[clap(long, hide = true)]
    pub no_clean: bool,

    /// Do not ask for confirmation before cleaning the database
    #[clap(short = 'y', long)]
    pub yes: bool,
}

impl Restore {
    pub async fn run(self, root: &RootConfig, global: &GlobalArgs) -> Result<RunReport> {
        let mut config = root
            .restore
            .clone()
            .ok_or_else(|| ConfigError::invalid("restore", "no restore section configured"))?;

        if self.clean {
            config.ddl.clean = true;
        } else if self.no_clean {
            config.ddl.clean = false;
        }

        if config.ddl.clean && !self.yes {
            let confirmed = confirm(
                "About to delete the database! input 'y' if that's what you want: ",
                io::stdin().lock(),
            )?;
            if !confirmed {
                return Err(PostgresError::Aborted(
                    "database clean was not confirmed".to_string(),
                ));
            }
        }

        let mut context =
            RunContext::connect(&config, global, ManifestAction::Restore, self.restore_id).await?;

        info!("Performing restore!");
        let outcome = restore_all(&config, context.adapter.as_ref(), &mut context.storage).await;

        context.finish(global, outcome)
    }
}

fn confirm(message: &str, mut input: impl BufRead) -> Result<bool> {
    print!("{message}");
    io::stdout().flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim_end_matches(['\r', '\n']) == "y")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_literal_y_confirms() {
        assert!(confirm("? ", "y\n".as_bytes()).unwrap());
        assert!(!confirm("? ", "yes\n".as_bytes()).unwrap());
        assert!(!confirm("? ", "".as_bytes()).unwrap());
    }
}
