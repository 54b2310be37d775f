use serde_json::{Map, Value};

use crate::{ConfigError, Result};

pub type RawConfig = Map<String, Value>;

/// An ordered stack of raw config maps, highest precedence first.
///
/// A lookup returns the value from the first map that *contains* the key, even
/// when that value is an explicit `null`; this is how a narrower section can
/// suppress a value it would otherwise inherit.
#[derive(Debug, Clone, Default)]
pub struct ConfigStack<'a> {
    layers: Vec<&'a RawConfig>,
}

impl<'a> ConfigStack<'a> {
    pub fn new(layers: impl IntoIterator<Item = &'a RawConfig>) -> Self {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Returns a new stack with `layer` in front, so lookups fall back to `self`.
    pub fn push<'b>(&self, layer: &'b RawConfig) -> ConfigStack<'b>
    where
        'a: 'b,
    {
        let mut layers: Vec<&'b RawConfig> = Vec::with_capacity(self.layers.len() + 1);
        layers.push(layer);
        for parent in &self.layers {
            layers.push(*parent);
        }
        ConfigStack { layers }
    }

    /// Pushes the section stored under `key` when it is a map.
    pub fn push_section(&self, key: &str) -> ConfigStack<'a> {
        match self.get(key) {
            Some(Value::Object(section)) => self.push(section),
            _ => self.clone(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.layers.iter().any(|layer| layer.contains_key(key))
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    /// Like [`ConfigStack::get`], treating an explicit `null` as absent.
    pub fn value(&self, key: &str) -> Option<&'a Value> {
        self.get(key).filter(|value| !value.is_null())
    }

    pub fn string(&self, key: &str) -> Result<Option<String>> {
        self.value(key).map(|value| as_string(key, value)).transpose()
    }

    pub fn string_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.string(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.value(key) {
            Some(value) => as_bool(key, value),
            None => Ok(default),
        }
    }

    pub fn string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.value(key) {
            Some(value) => as_string_list(key, value),
            None => Ok(Vec::new()),
        }
    }
}

pub(crate) fn as_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ConfigError::invalid(key, format!("expected a string, got {other}"))),
    }
}

/// Booleans arrive as strings from the environment; the empty string is `false`.
pub(crate) fn as_bool(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_i64().map(|n| n != 0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" | "" => Ok(false),
            other => Err(ConfigError::invalid(key, format!("`{other}` is not a boolean"))),
        },
        // `ddl: {enabled: ...}` is accepted wherever a bool is
        Value::Object(section) => match section.get("enabled") {
            Some(enabled) if !enabled.is_null() => as_bool(key, enabled),
            _ => Ok(false),
        },
        other => Err(ConfigError::invalid(key, format!("expected a boolean, got {other}"))),
    }
}

pub(crate) fn as_string_list(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => items.iter().map(|item| as_string(key, item)).collect(),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()),
        other => Err(ConfigError::invalid(key, format!("expected a list, got {other}"))),
    }
}

pub(crate) fn as_u16(key: &str, value: &Value) -> Result<u16> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ConfigError::invalid(key, format!("`{value}` is not a port number")))
}
