use serde::Serialize;
use serde_json::{Map, Value};

use super::connection::{self, Connection, ConnectionRef};
use super::stack::{as_bool, as_string, ConfigStack};
use crate::paths::join_paths;
use crate::{ConfigError, Result};

pub const DEFAULT_LOCATION: &str = "backups/{table}";
pub const DEFAULT_QUERY: &str = "select * from {table}";
pub const DEFAULT_STRATEGY: &str = "use_latest_filename";
pub const DEFAULT_DDL_LOCATION: &str = "ddl";

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RootConfig {
    pub backup: Option<BackupConfig>,
    pub restore: Option<RestoreConfig>,
}

impl RootConfig {
    pub fn from_stack(stack: &ConfigStack<'_>) -> Result<Self> {
        Self::with_overrides(stack, None)
    }

    /// Resolves both sections with `overrides` stacked above each section, so
    /// command line values also beat keys set inside `backup`/`restore`.
    pub fn with_overrides<'a>(
        stack: &ConfigStack<'a>,
        overrides: Option<&'a Map<String, Value>>,
    ) -> Result<Self> {
        let section = |key: &str| {
            let section = stack.push_section(key);
            match overrides {
                Some(overrides) => section.push(overrides),
                None => section,
            }
        };

        let backup = BackupConfig::from_stack(&section("backup"))?;
        let restore = RestoreConfig::from_stack(&section("restore"))?;
        Ok(Self {
            backup: Some(backup),
            restore: Some(restore),
        })
    }

    pub fn from_raw(raw: &Map<String, Value>) -> Result<Self> {
        Self::from_stack(&ConfigStack::new([raw]))
    }
}

/// Behaviour shared by the per-table configs of both sections.
pub trait TableConfig: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// The config section these tables live under.
    const SECTION: &'static str;

    fn from_stack(stack: &ConfigStack<'_>, root_location: Option<&str>) -> Result<Self>;

    fn name(&self) -> &str;
    fn location(&self) -> &str;
    fn exclude(&self) -> &[String];
    fn compression(&self) -> Option<&str>;
    fn ddl(&self) -> bool;
    fn sequences(&self) -> bool;
    fn data(&self) -> bool;
    fn follow_foreign_keys(&self) -> bool;
    fn strict(&self) -> bool;

    /// A copy of this config applied to another table at another location.
    fn for_table(&self, name: &str, location: String) -> Self;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupTableConfig {
    pub name: String,
    pub location: String,
    pub query: String,
    pub compression: Option<String>,
    pub exclude: Vec<String>,
    pub ddl: bool,
    pub sequences: bool,
    pub data: bool,
    pub follow_foreign_keys: bool,
    pub strict: bool,
    pub skip_if_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreTableConfig {
    pub name: String,
    pub location: String,
    pub strategy: String,
    pub compression: Option<String>,
    pub exclude: Vec<String>,
    pub ddl: bool,
    pub sequences: bool,
    pub data: bool,
    pub truncate: bool,
    pub follow_foreign_keys: bool,
    pub strict: bool,
}

fn table_name(stack: &ConfigStack<'_>) -> Result<String> {
    stack
        .string("name")?
        .ok_or_else(|| ConfigError::invalid("tables", "every table needs a `name`"))
}

fn table_location(stack: &ConfigStack<'_>, root_location: Option<&str>) -> Result<String> {
    let location = stack.string_or("location", DEFAULT_LOCATION)?;
    join_paths(root_location.into_iter().chain([location.as_str()]))
}

impl TableConfig for BackupTableConfig {
    const SECTION: &'static str = "backup";

    fn from_stack(stack: &ConfigStack<'_>, root_location: Option<&str>) -> Result<Self> {
        Ok(Self {
            name: table_name(stack)?,
            location: table_location(stack, root_location)?,
            query: stack.string_or("query", DEFAULT_QUERY)?,
            compression: stack.string("compression")?,
            exclude: stack.string_list("exclude")?,
            ddl: stack.bool_or("ddl", true)?,
            sequences: stack.bool_or("sequences", true)?,
            data: stack.bool_or("data", true)?,
            follow_foreign_keys: stack.bool_or("follow_foreign_keys", false)?,
            strict: stack.bool_or("strict", false)?,
            skip_if_exists: stack.bool_or("skip_if_exists", false)?,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn exclude(&self) -> &[String] {
        &self.exclude
    }
    fn compression(&self) -> Option<&str> {
        self.compression.as_deref()
    }
    fn ddl(&self) -> bool {
        self.ddl
    }
    fn sequences(&self) -> bool {
        self.sequences
    }
    fn data(&self) -> bool {
        self.data
    }
    fn follow_foreign_keys(&self) -> bool {
        self.follow_foreign_keys
    }
    fn strict(&self) -> bool {
        self.strict
    }

    fn for_table(&self, name: &str, location: String) -> Self {
        Self {
            name: name.to_string(),
            location,
            ..self.clone()
        }
    }
}

impl TableConfig for RestoreTableConfig {
    const SECTION: &'static str = "restore";

    fn from_stack(stack: &ConfigStack<'_>, root_location: Option<&str>) -> Result<Self> {
        Ok(Self {
            name: table_name(stack)?,
            location: table_location(stack, root_location)?,
            strategy: stack.string_or("strategy", DEFAULT_STRATEGY)?,
            compression: stack.string("compression")?,
            exclude: stack.string_list("exclude")?,
            ddl: stack.bool_or("ddl", true)?,
            sequences: stack.bool_or("sequences", true)?,
            data: stack.bool_or("data", true)?,
            truncate: stack.bool_or("truncate", false)?,
            follow_foreign_keys: stack.bool_or("follow_foreign_keys", false)?,
            strict: stack.bool_or("strict", false)?,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn exclude(&self) -> &[String] {
        &self.exclude
    }
    fn compression(&self) -> Option<&str> {
        self.compression.as_deref()
    }
    fn ddl(&self) -> bool {
        self.ddl
    }
    fn sequences(&self) -> bool {
        self.sequences
    }
    fn data(&self) -> bool {
        self.data
    }
    fn follow_foreign_keys(&self) -> bool {
        self.follow_foreign_keys
    }
    fn strict(&self) -> bool {
        self.strict
    }

    fn for_table(&self, name: &str, location: String) -> Self {
        Self {
            name: name.to_string(),
            location,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DdlConfig {
    pub enabled: bool,
    pub location: String,
    /// Restore only: drop and recreate the target database first.
    pub clean: bool,
    pub strategy: String,
}

impl DdlConfig {
    fn from_value(value: Option<&Value>, root_location: Option<&str>) -> Result<Self> {
        let mut ddl = DdlConfig {
            enabled: false,
            location: DEFAULT_DDL_LOCATION.to_string(),
            clean: false,
            strategy: DEFAULT_STRATEGY.to_string(),
        };

        match value {
            None | Some(Value::Null) => {}
            Some(Value::Object(section)) => {
                let present = |key: &str| section.get(key).filter(|v| !v.is_null());
                if let Some(enabled) = present("enabled") {
                    ddl.enabled = as_bool("ddl.enabled", enabled)?;
                }
                if let Some(location) = present("location") {
                    ddl.location = as_string("ddl.location", location)?;
                }
                if let Some(clean) = present("clean") {
                    ddl.clean = as_bool("ddl.clean", clean)?;
                }
                if let Some(strategy) = present("strategy") {
                    ddl.strategy = as_string("ddl.strategy", strategy)?;
                }
            }
            Some(flag) => ddl.enabled = as_bool("ddl", flag)?,
        }

        ddl.location = join_paths(root_location.into_iter().chain([ddl.location.as_str()]))?;
        Ok(ddl)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct S3Config {
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "INFO".to_string(),
        }
    }
}

fn optional_field(section: &Map<String, Value>, prefix: &str, key: &str) -> Result<Option<String>> {
    match section.get(key) {
        Some(value) if !value.is_null() => as_string(&format!("{prefix}.{key}"), value).map(Some),
        _ => Ok(None),
    }
}

fn section<'a>(stack: &ConfigStack<'a>, key: &str) -> Result<Option<&'a Map<String, Value>>> {
    match stack.value(key) {
        None => Ok(None),
        Some(Value::Object(section)) => Ok(Some(section)),
        Some(other) => Err(ConfigError::invalid(key, format!("expected a map, got {other}"))),
    }
}

impl S3Config {
    fn from_stack(stack: &ConfigStack<'_>) -> Result<Option<Self>> {
        let Some(s3) = section(stack, "s3")? else {
            return Ok(None);
        };
        Ok(Some(Self {
            aws_access_key_id: optional_field(s3, "s3", "aws_access_key_id")?,
            aws_secret_access_key: optional_field(s3, "s3", "aws_secret_access_key")?,
            region: optional_field(s3, "s3", "region")?,
            profile: optional_field(s3, "s3", "profile")?,
            endpoint: optional_field(s3, "s3", "endpoint")?,
        }))
    }
}

impl SentryConfig {
    fn from_stack(stack: &ConfigStack<'_>) -> Result<Option<Self>> {
        let Some(sentry) = section(stack, "sentry")? else {
            return Ok(None);
        };
        Ok(Some(Self {
            dsn: optional_field(sentry, "sentry", "dsn")?,
            environment: optional_field(sentry, "sentry", "environment")?,
            version: optional_field(sentry, "sentry", "version")?,
        }))
    }
}

impl LoggingConfig {
    fn from_stack(stack: &ConfigStack<'_>) -> Result<Self> {
        let mut logging = Self::default();
        if let Some(section) = section(stack, "logging")? {
            if let Some(enabled) = section.get("enabled").filter(|v| !v.is_null()) {
                logging.enabled = as_bool("logging.enabled", enabled)?;
            }
            if let Some(level) = optional_field(section, "logging", "level")? {
                logging.level = level;
            }
        }
        Ok(logging)
    }
}

/// Converts the three accepted table declaration shapes into a list of maps.
///
/// `["a", "b"]`, `[{"name": "a"}, "b"]` and `{"a": {...}, "b": {...}}` are all accepted.
pub fn normalize_table_config(tables: Option<&Value>) -> Result<Vec<Map<String, Value>>> {
    let named = |name: &str| {
        let mut map = Map::new();
        map.insert("name".to_string(), Value::String(name.to_string()));
        map
    };

    match tables {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(list)) => Ok(list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(named)
            .collect()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(named(name)),
                Value::Object(map) => Ok(map.clone()),
                other => Err(ConfigError::invalid("tables", format!("unexpected entry {other}"))),
            })
            .collect(),
        Some(Value::Object(keyed)) => keyed
            .iter()
            .map(|(name, value)| {
                let mut map = named(name);
                match value {
                    Value::Object(fields) => {
                        for (key, field) in fields {
                            map.insert(key.clone(), field.clone());
                        }
                    }
                    Value::Null => {}
                    other => {
                        return Err(ConfigError::invalid(
                            "tables",
                            format!("expected a map for `{name}`, got {other}"),
                        ))
                    }
                }
                Ok(map)
            })
            .collect(),
        Some(other) => Err(ConfigError::invalid("tables", format!("expected a list, got {other}"))),
    }
}

/// A `backup` or `restore` section.
#[derive(Debug, Clone, Serialize)]
pub struct TableParentConfig<T> {
    pub connection: Option<ConnectionRef>,
    pub connections: Vec<Connection>,
    pub tables: Vec<T>,
    pub ddl: DdlConfig,
    pub manifest: Option<String>,
    pub root_location: Option<String>,
    pub adapter: Option<String>,
    pub s3: Option<S3Config>,
    pub sentry: Option<SentryConfig>,
    pub logging: LoggingConfig,
}

pub type BackupConfig = TableParentConfig<BackupTableConfig>;
pub type RestoreConfig = TableParentConfig<RestoreTableConfig>;

impl<T: TableConfig> TableParentConfig<T> {
    pub fn from_stack(stack: &ConfigStack<'_>) -> Result<Self> {
        let root_location = stack.string("root_location")?;

        let table_maps = normalize_table_config(stack.value("tables"))?;
        let tables = table_maps
            .iter()
            .map(|table| T::from_stack(&stack.push(table), root_location.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            connection: connection::connection_ref(stack)?,
            connections: connection::connections(stack)?,
            tables,
            ddl: DdlConfig::from_value(stack.value("ddl"), root_location.as_deref())?,
            manifest: stack.string("manifest")?,
            adapter: stack.string("adapter")?,
            s3: S3Config::from_stack(stack)?,
            sentry: SentryConfig::from_stack(stack)?,
            logging: LoggingConfig::from_stack(stack)?,
            root_location,
        })
    }

    /// Resolves `connection` against the declared `connections`.
    ///
    /// With nothing configured, a connection named `default` is used if declared.
    pub fn resolve_connection(&self) -> Result<Connection> {
        let name = match &self.connection {
            Some(ConnectionRef::Inline(connection)) => return Ok(connection.clone()),
            Some(ConnectionRef::Named(name)) => name.as_str(),
            None => "default",
        };

        match self
            .connections
            .iter()
            .find(|connection| connection.name.as_deref() == Some(name))
        {
            Some(connection) => Ok(connection.clone()),
            None if self.connection.is_none() => {
                Err(ConfigError::MissingConnection(T::SECTION.to_string()))
            }
            None => Err(ConfigError::UnknownConnection(name.to_string())),
        }
    }

    /// True when any configured location points at an object store.
    pub fn uses_s3(&self) -> bool {
        crate::paths::is_s3_path(&self.ddl.location)
            || self
                .tables
                .iter()
                .any(|table| crate::paths::is_s3_path(table.location()))
    }
}
