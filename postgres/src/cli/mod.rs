//! Command line surface: global flags shared by every subcommand, and the subcommands.

pub mod commands;

use clap::{Args, Subcommand};
use common::config::{ConfigFormat, ConfigSources, RawConfig, DEFAULT_CONFIG_FILE};
use common::{ConfigError, RootConfig};
use serde_json::Value;
use std::io::Read;

use crate::Result;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up the configured tables
    Backup(commands::backup::Backup),

    /// Restore the configured tables from their latest backups
    Restore(commands::restore::Restore),

    /// Print the fully resolved configuration
    Config(commands::config::Config),
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file; repeat to layer several, earlier files take precedence
    #[clap(short = 'c', long = "config", global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Abort the run on the first table that fails
    #[clap(long, global = true, overrides_with = "no_strict")]
    pub strict: bool,

    #[clap(long, global = true, hide = true)]
    pub no_strict: bool,

    /// Adapter to use: postgres, or anything else for the portable fallback
    #[clap(short = 'a', long, global = true)]
    pub adapter: Option<String>,

    /// Back up or restore DDL, overriding `ddl.enabled`
    #[clap(long, global = true, overrides_with = "no_ddl")]
    pub ddl: bool,

    #[clap(long, global = true, hide = true)]
    pub no_ddl: bool,

    /// Database url to connect to
    #[clap(short = 'u', long, global = true)]
    pub url: Option<String>,

    /// Named connection (or a url) to connect to
    #[clap(long = "connection", visible_alias = "conn", global = true)]
    pub connection: Option<String>,

    /// Location to read backups from or write them to
    #[clap(short = 'l', long, global = true)]
    pub location: Option<String>,

    /// Table to back up or restore; replaces any configured tables
    #[clap(short = 't', long = "table", global = true)]
    pub tables: Vec<String>,

    /// Table pattern to exclude
    #[clap(short = 'x', long = "exclude", global = true)]
    pub exclude: Vec<String>,

    /// Config given inline, layered between the environment and config files
    #[clap(long, global = true, conflicts_with = "stdin")]
    pub raw_config: Option<String>,

    /// Format of `--raw-config` or `--stdin` input
    #[clap(long, global = true, default_value = "yaml")]
    pub raw_config_format: String,

    /// Read raw config from stdin
    #[clap(long, global = true)]
    pub stdin: bool,

    /// Read everything but write nothing
    #[clap(long, global = true)]
    pub dry_run: bool,

    /// Print per-table stats at the end of the run
    #[clap(long, global = true)]
    pub stats: bool,
}

fn flag(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl GlobalArgs {
    pub fn strict_flag(&self) -> Option<bool> {
        flag(self.strict, self.no_strict)
    }

    pub fn ddl_flag(&self) -> Option<bool> {
        flag(self.ddl, self.no_ddl)
    }

    /// The command line layer of the config stack.
    pub fn cli_config(&self) -> Result<RawConfig> {
        let mut config = RawConfig::new();

        let connection = match (&self.url, &self.connection) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::ConflictingOptions(
                    "`--url` and `--connection` cannot be used together".to_string(),
                )
                .into())
            }
            (Some(url), None) => Some(url),
            (None, connection) => connection.as_ref(),
        };
        if let Some(connection) = connection {
            config.insert("connection".into(), Value::String(connection.clone()));
        }

        if let Some(strict) = self.strict_flag() {
            config.insert("strict".into(), Value::Bool(strict));
        }
        if let Some(adapter) = &self.adapter {
            config.insert("adapter".into(), Value::String(adapter.clone()));
        }
        if let Some(location) = &self.location {
            config.insert("location".into(), Value::String(location.clone()));
        }
        if !self.tables.is_empty() {
            config.insert("tables".into(), string_array(&self.tables));
        }
        if !self.exclude.is_empty() {
            config.insert("exclude".into(), string_array(&self.exclude));
        }

        Ok(config)
    }

    /// Raw config text from `--raw-config` or stdin, parsed.
    pub fn raw_config(&self) -> Result<Option<RawConfig>> {
        let text = match (&self.raw_config, self.stdin) {
            (Some(text), _) => text.clone(),
            (None, true) => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                text
            }
            (None, false) => return Ok(None),
        };

        let format: ConfigFormat = self.raw_config_format.parse()?;
        Ok(Some(format.parse(&text, "raw config")?))
    }

    /// Loads every config source and resolves them into one config.
    pub fn resolve(&self) -> Result<RootConfig> {
        let sources = ConfigSources::load(self.cli_config()?, self.raw_config()?, &self.config)?;
        let mut root = sources.resolve()?;

        // `--ddl` flips the switch without discarding the configured ddl location.
        if let Some(enabled) = self.ddl_flag() {
            if let Some(backup) = root.backup.as_mut() {
                backup.ddl.enabled = enabled;
                backup.tables.iter_mut().for_each(|table| table.ddl = enabled);
            }
            if let Some(restore) = root.restore.as_mut() {
                restore.ddl.enabled = enabled;
                restore.tables.iter_mut().for_each(|table| table.ddl = enabled);
            }
        }

        Ok(root)
    }
}

fn string_array(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}
