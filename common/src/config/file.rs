use config::{Config, File, FileFormat};
use log::{debug, warn};
use std::path::Path;
use std::str::FromStr;

use super::stack::RawConfig;
use crate::{ConfigError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "config.pgstash.yml";

/// Serialization formats accepted for config files and raw config text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl FromStr for ConfigFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl From<ConfigFormat> for FileFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Yaml => FileFormat::Yaml,
            ConfigFormat::Json => FileFormat::Json,
            ConfigFormat::Toml => FileFormat::Toml,
        }
    }
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        extension.parse().map_err(|_| {
            ConfigError::UnsupportedFormat(format!("{} (unknown extension)", path.display()))
        })
    }

    /// Parses `text` into a raw config map; an empty document is an empty map.
    pub fn parse(&self, text: &str, source_name: &str) -> Result<RawConfig> {
        if text.trim().is_empty() {
            return Ok(RawConfig::new());
        }

        build(
            Config::builder().add_source(File::from_str(text, FileFormat::from(*self))),
            source_name,
        )
    }
}

/// Builds one config layer and hands its tree over as a raw map.
pub(crate) fn build(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    source_name: &str,
) -> Result<RawConfig> {
    builder
        .build()
        .and_then(|config| config.try_deserialize::<RawConfig>())
        .map_err(|e| ConfigError::parse(source_name, e))
}

pub fn load_file(path: &str) -> Result<RawConfig> {
    let expanded = shellexpand::full(path).map_err(|e| ConfigError::invalid("config", e.to_string()))?;
    let path = Path::new(expanded.as_ref());
    let format = ConfigFormat::from_path(path)?;
    let name = path.display().to_string();
    if !path.is_file() {
        return Err(std::io::Error::new(std::io::ErrorKind::NotFound, name).into());
    }

    let config = build(
        Config::builder().add_source(File::new(&name, FileFormat::from(format))),
        &name,
    )?;
    debug!("Loaded config file {name}");
    Ok(config)
}

/// Loads config files in precedence order, skipping files that do not exist.
pub fn load_files(paths: &[String]) -> Result<Vec<RawConfig>> {
    let mut configs = Vec::with_capacity(paths.len());

    for path in paths {
        let expanded = shellexpand::full(path)
            .map_err(|e| ConfigError::invalid("config", e.to_string()))?
            .into_owned();

        if !Path::new(&expanded).exists() {
            if path != DEFAULT_CONFIG_FILE {
                warn!("Config file {expanded} does not exist, skipping");
            }
            continue;
        }

        configs.push(load_file(&expanded)?);
    }

    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn all_formats_normalize_to_the_same_shape() {
        let dir = TempDir::new().unwrap();
        let yaml = write(&dir, "a.yml", "backup:\n  tables:\n    - public.store\n");
        let json = write(&dir, "b.json", r#"{"backup": {"tables": ["public.store"]}}"#);
        let toml = write(&dir, "c.toml", "[backup]\ntables = [\"public.store\"]\n");

        let yaml = load_file(&yaml).unwrap();
        assert_eq!(yaml, load_file(&json).unwrap());
        assert_eq!(yaml, load_file(&toml).unwrap());
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let ini = write(&dir, "config.ini", "[backup]\n");
        assert!(matches!(load_file(&ini), Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let present = write(&dir, "present.yml", "location: here\n");
        let missing = dir.path().join("missing.yml").to_string_lossy().into_owned();

        let configs = load_files(&[missing, present]).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0]["location"], "here");
    }

    #[test]
    fn empty_yaml_is_an_empty_map() {
        assert!(ConfigFormat::Yaml.parse("", "stdin").unwrap().is_empty());
    }

    #[test]
    fn raw_text_keeps_types_and_dotted_keys() {
        let config = ConfigFormat::Yaml
            .parse("tables:\n  public.store:\n    truncate: true\n    batch: 5\n", "stdin")
            .unwrap();
        assert_eq!(config["tables"]["public.store"]["truncate"], true);
        assert_eq!(config["tables"]["public.store"]["batch"], 5);
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        assert!(matches!(
            ConfigFormat::Json.parse("{not json", "stdin"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn raw_format_names() {
        assert_eq!("YAML".parse::<ConfigFormat>().unwrap(), ConfigFormat::Yaml);
        assert!(matches!(
            "xml".parse::<ConfigFormat>(),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
