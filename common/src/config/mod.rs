//! Layered configuration: command line > environment > raw text > files.

mod connection;
mod file;
mod models;
mod stack;

pub use connection::{Connection, ConnectionParams, ConnectionRef, ConnectionTarget};
pub use file::{load_file, load_files, ConfigFormat, DEFAULT_CONFIG_FILE};
pub use models::{
    normalize_table_config, BackupConfig, BackupTableConfig, DdlConfig, LoggingConfig,
    RestoreConfig, RestoreTableConfig, RootConfig, S3Config, SentryConfig, TableConfig,
    TableParentConfig, DEFAULT_DDL_LOCATION, DEFAULT_LOCATION, DEFAULT_QUERY, DEFAULT_STRATEGY,
};
pub use stack::{ConfigStack, RawConfig};

use config::{Config, Environment};

use crate::Result;

pub const ENV_PREFIX: &str = "PGSTASH";

/// Builds a nested map from prefixed environment variables.
///
/// `PGSTASH_BACKUP__DDL=true` becomes `{"backup": {"ddl": true}}`. Scalars are
/// parsed where they look like booleans or numbers; empty values stay empty strings.
pub fn environment_config<I>(prefix: &str, vars: I) -> Result<RawConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let source: config::Map<String, String> = vars.into_iter().collect();
    let environment = Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(Some(source));

    file::build(Config::builder().add_source(environment), "environment")
}

/// The raw config maps of one invocation, kept per source until resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub cli: RawConfig,
    pub env: RawConfig,
    pub raw: Option<RawConfig>,
    pub files: Vec<RawConfig>,
}

impl ConfigSources {
    /// Collects the environment with [`ENV_PREFIX`] and the given files.
    pub fn load(cli: RawConfig, raw: Option<RawConfig>, files: &[String]) -> Result<Self> {
        Ok(Self {
            cli,
            env: environment_config(ENV_PREFIX, std::env::vars())?,
            raw,
            files: load_files(files)?,
        })
    }

    pub fn layers(&self) -> Vec<&RawConfig> {
        let mut layers = vec![&self.cli, &self.env];
        layers.extend(self.raw.iter());
        layers.extend(self.files.iter());
        layers
    }

    pub fn resolve(&self) -> Result<RootConfig> {
        RootConfig::with_overrides(&ConfigStack::new(self.layers()), Some(&self.cli))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use serde_json::{json, Value};
    use serial_test::serial;

    fn raw(value: Value) -> RawConfig {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn env(vars: &[(&str, &str)]) -> RawConfig {
        environment_config(
            ENV_PREFIX,
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn environment_paths_nest_on_double_underscore() {
        let config = env(&[
            ("PGSTASH_BACKUP__DDL", "true"),
            ("PGSTASH_LOCATION", ""),
            ("OTHER_LOCATION", "ignored"),
        ]);
        assert_eq!(
            Value::Object(config),
            json!({"backup": {"ddl": true}, "location": ""})
        );
    }

    #[test]
    #[serial]
    fn load_reads_process_environment() {
        std::env::set_var("PGSTASH_RESTORE__STRATEGY", "use_latest_metadata");
        let sources = ConfigSources::load(RawConfig::new(), None, &[]).unwrap();
        std::env::remove_var("PGSTASH_RESTORE__STRATEGY");

        assert_eq!(
            sources.env["restore"]["strategy"],
            Value::String("use_latest_metadata".into())
        );
    }

    #[test]
    fn precedence_is_cli_then_env_then_files() {
        let file = raw(json!({"location": "file", "tables": ["public.store"]}));
        let with_env = env(&[("PGSTASH_LOCATION", "env")]);
        let cli = raw(json!({"location": "cli"}));

        let mut sources = ConfigSources {
            cli,
            env: with_env,
            raw: None,
            files: vec![file],
        };
        let location = |sources: &ConfigSources| {
            sources.resolve().unwrap().backup.unwrap().tables[0].location.clone()
        };
        assert_eq!(location(&sources), "cli");

        sources.cli = RawConfig::new();
        assert_eq!(location(&sources), "env");

        sources.env = RawConfig::new();
        assert_eq!(location(&sources), "file");
    }

    #[test]
    fn cli_tables_replace_section_tables() {
        let sources = ConfigSources {
            cli: raw(json!({"tables": ["public.only"]})),
            files: vec![raw(json!({"backup": {"tables": ["public.a", "public.b"], "query": "q"}}))],
            ..Default::default()
        };
        let backup = sources.resolve().unwrap().backup.unwrap();
        assert_eq!(backup.tables.len(), 1);
        assert_eq!(backup.tables[0].name, "public.only");
        assert_eq!(backup.tables[0].query, "q");
    }

    #[test]
    fn raw_text_sits_between_env_and_files() {
        let sources = ConfigSources {
            raw: Some(raw(json!({"tables": ["a"], "location": "raw"}))),
            files: vec![raw(json!({"location": "file"}))],
            ..Default::default()
        };
        let config = sources.resolve().unwrap();
        assert_eq!(config.backup.unwrap().tables[0].location, "raw");
    }

    #[test]
    fn query_inherits_through_sections() {
        let config = RootConfig::from_raw(&raw(json!({
            "query": "root query",
            "backup": {"tables": [{"name": "public.a"}]},
        })))
        .unwrap();
        assert_eq!(config.backup.unwrap().tables[0].query, "root query");

        let config = RootConfig::from_raw(&raw(json!({
            "query": "root query",
            "backup": {"query": "backup query", "tables": ["public.a"]},
        })))
        .unwrap();
        assert_eq!(config.backup.unwrap().tables[0].query, "backup query");
    }

    #[test]
    fn leaf_values_override_inherited_ones() {
        let config = RootConfig::from_raw(&raw(json!({
            "url": "postgresql://root",
            "query": "root_query",
            "location": "root_location",
            "backup": {
                "url": "postgresql://backup",
                "query": "backup_query",
                "tables": [{"name": "t1", "query": "t1_query", "location": "t1_location"}],
            },
        })))
        .unwrap();

        let backup = config.backup.unwrap();
        assert_eq!(backup.tables[0].query, "t1_query");
        assert_eq!(backup.tables[0].location, "t1_location");
        assert_eq!(backup.resolve_connection().unwrap().dsn(), "postgresql://backup");
        assert_eq!(
            config.restore.unwrap().resolve_connection().unwrap().dsn(),
            "postgresql://root"
        );
    }

    #[test]
    fn table_shapes_normalize() {
        let expected = vec!["public.a".to_string(), "public.b".to_string()];
        for tables in [
            json!(["public.a", "public.b"]),
            json!([{"name": "public.a"}, "public.b"]),
            json!({"public.a": {}, "public.b": {"location": "x"}}),
        ] {
            let config = RootConfig::from_raw(&raw(json!({ "tables": tables }))).unwrap();
            let names: Vec<String> = config
                .backup
                .unwrap()
                .tables
                .iter()
                .map(|t| t.name.clone())
                .collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn defaults_apply() {
        let config = RootConfig::from_raw(&raw(json!({"tables": ["a"]}))).unwrap();
        let backup = config.backup.unwrap();
        assert_eq!(backup.tables[0].location, DEFAULT_LOCATION);
        assert_eq!(backup.tables[0].query, DEFAULT_QUERY);
        assert!(backup.tables[0].ddl && backup.tables[0].data && backup.tables[0].sequences);
        assert!(!backup.ddl.enabled);
        assert_eq!(backup.ddl.location, "ddl");
        assert_eq!(config.restore.unwrap().tables[0].strategy, DEFAULT_STRATEGY);
    }

    #[test]
    fn parent_ddl_section_disables_tables() {
        let config = RootConfig::from_raw(&raw(json!({
            "ddl": {"enabled": false},
            "tables": ["t1"],
        })))
        .unwrap();
        assert!(!config.backup.unwrap().tables[0].ddl);
        assert!(!config.restore.unwrap().tables[0].ddl);
    }

    #[test]
    fn root_location_prefixes_locations() {
        let config = RootConfig::from_raw(&raw(json!({
            "root_location": "s3://sample-bucket/root-path/",
            "tables": [{"name": "public.store", "location": "/public.store/"}],
            "ddl": {"enabled": true, "location": "ddl"},
        })))
        .unwrap();
        let backup = config.backup.unwrap();
        assert_eq!(backup.tables[0].location, "s3://sample-bucket/root-path/public.store");
        assert_eq!(backup.ddl.location, "s3://sample-bucket/root-path/ddl");
        assert!(backup.uses_s3());
    }

    #[test]
    fn conflicting_buckets_are_config_errors() {
        let err = RootConfig::from_raw(&raw(json!({
            "root_location": "s3://one/root",
            "tables": [{"name": "a", "location": "s3://two/a"}],
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigError::BucketMismatch { .. }));
    }

    #[test]
    fn named_connections_resolve() {
        let config = RootConfig::from_raw(&raw(json!({
            "connections": {
                "local": "postgresql://localhost/app",
                "params": {"host": "db", "port": 5433, "database": "app", "username": "me"},
            },
            "backup": {"connection": "local"},
            "restore": {"connection": "params"},
        })))
        .unwrap();

        let backup = config.backup.unwrap().resolve_connection().unwrap();
        assert_eq!(backup.name.as_deref(), Some("local"));
        assert_eq!(backup.dsn(), "postgresql://localhost/app");

        let restore = config.restore.unwrap().resolve_connection().unwrap();
        assert_eq!(restore.dsn(), "host=db port=5433 dbname=app user=me");
    }

    #[test]
    fn connection_list_declarations() {
        let config = RootConfig::from_raw(&raw(json!({
            "connections": [{"name": "default", "url": "postgresql://localhost/app"}],
        })))
        .unwrap();
        let connection = config.backup.unwrap().resolve_connection().unwrap();
        assert_eq!(connection.name.as_deref(), Some("default"));
    }

    #[test]
    fn connection_errors() {
        let config = RootConfig::from_raw(&RawConfig::new()).unwrap();
        assert!(matches!(
            config.backup.unwrap().resolve_connection(),
            Err(ConfigError::MissingConnection(section)) if section == "backup"
        ));

        let config = RootConfig::from_raw(&raw(json!({"connection": "nope"}))).unwrap();
        assert!(matches!(
            config.restore.unwrap().resolve_connection(),
            Err(ConfigError::UnknownConnection(name)) if name == "nope"
        ));
    }

    #[test]
    fn sentry_and_s3_sections() {
        let config = RootConfig::from_raw(&raw(json!({
            "sentry": {"dsn": "https://key@sentry.example/1", "environment": "prod"},
            "s3": {"region": "us-west-2", "profile": "backups"},
        })))
        .unwrap();
        let backup = config.backup.unwrap();
        assert_eq!(backup.sentry.unwrap().environment.as_deref(), Some("prod"));
        let s3 = backup.s3.unwrap();
        assert_eq!(s3.region.as_deref(), Some("us-west-2"));
        assert_eq!(s3.profile.as_deref(), Some("backups"));
    }
}
