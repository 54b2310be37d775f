use anyhow::Result;
use clap::Parser;
use common::{LoggingConfig, RootConfig, SentryConfig};
use log::LevelFilter;
use postgres::cli::{Commands, GlobalArgs};

#[derive(Parser, Debug)]
#[clap(name = "pgstash", about = "Table-level PostgreSQL backup and restore", version)]
struct Cli {
    #[clap(flatten)]
    global: GlobalArgs,

    #[clap(subcommand)]
    command: Commands,
}

impl Cli {
    fn section_settings(&self, root: &RootConfig) -> (Option<SentryConfig>, Option<LoggingConfig>) {
        match &self.command {
            Commands::Backup(_) => root
                .backup
                .as_ref()
                .map(|c| (c.sentry.clone(), Some(c.logging.clone())))
                .unwrap_or_default(),
            Commands::Restore(_) => root
                .restore
                .as_ref()
                .map(|c| (c.sentry.clone(), Some(c.logging.clone())))
                .unwrap_or_default(),
            Commands::Config(_) => (None, None),
        }
    }
}

fn level_filter(verbosity: u8, logging: Option<&LoggingConfig>) -> LevelFilter {
    match verbosity {
        0 => logging
            .filter(|logging| logging.enabled)
            .and_then(|logging| logging.level.parse().ok())
            .unwrap_or(LevelFilter::Info),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logging(level: LevelFilter) -> Result<()> {
    let logger = env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .format_level(true)
        .format_module_path(false)
        .format_indent(Some(4))
        .filter_level(level)
        .parse_default_env()
        .build();

    let max_level = logger.filter();
    log::set_boxed_logger(Box::new(sentry_log::SentryLogger::with_dest(logger)))?;
    log::set_max_level(max_level);
    Ok(())
}

fn init_sentry(config: Option<&SentryConfig>) -> Option<sentry::ClientInitGuard> {
    let config = config?;
    let dsn = config.dsn.as_deref()?;

    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: config.version.clone().map(Into::into),
            environment: config.environment.clone().map(Into::into),
            ..Default::default()
        },
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.global.resolve()?;

    let (sentry_config, logging) = cli.section_settings(&root);
    init_logging(level_filter(cli.global.verbose, logging.as_ref()))?;
    let _sentry = init_sentry(sentry_config.as_ref());

    match cli.command {
        Commands::Backup(backup) => {
            backup.run(&root, &cli.global).await?;
        }
        Commands::Restore(restore) => {
            restore.run(&root, &cli.global).await?;
        }
        Commands::Config(config) => {
            config.run(&root)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_beats_logging_config() {
        let logging = LoggingConfig {
            enabled: true,
            level: "WARN".to_string(),
        };
        assert_eq!(level_filter(0, Some(&logging)), LevelFilter::Warn);
        assert_eq!(level_filter(1, Some(&logging)), LevelFilter::Debug);
        assert_eq!(level_filter(3, None), LevelFilter::Trace);
    }

    #[test]
    fn disabled_logging_config_is_ignored() {
        let logging = LoggingConfig {
            enabled: false,
            level: "ERROR".to_string(),
        };
        assert_eq!(level_filter(0, Some(&logging)), LevelFilter::Info);
    }
}
