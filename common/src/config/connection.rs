use serde::Serialize;
use serde_json::Value;

use super::stack::{as_string, as_u16, ConfigStack};
use crate::{ConfigError, Result};

/// Structured connection details, as an alternative to a url.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drivername: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConnectionTarget {
    Url(String),
    Params(ConnectionParams),
}

/// A database connection, optionally declared under a name in `connections`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: ConnectionTarget,
}

/// The `connection`/`url` value of a section before named connections are looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConnectionRef {
    Named(String),
    Inline(Connection),
}

impl Connection {
    /// A libpq-style connection string accepted by `tokio_postgres`.
    pub fn dsn(&self) -> String {
        match &self.url {
            ConnectionTarget::Url(url) => url.clone(),
            ConnectionTarget::Params(params) => params.dsn(),
        }
    }

    /// The dialect named by the url scheme or `drivername`, e.g. `postgresql+psycopg2` -> `postgresql`.
    pub fn dialect(&self) -> Option<String> {
        let driver = match &self.url {
            ConnectionTarget::Url(url) => url.split_once("://").map(|(scheme, _)| scheme),
            ConnectionTarget::Params(params) => params.drivername.as_deref(),
        }?;
        driver.split('+').next().map(str::to_string)
    }
}

impl ConnectionParams {
    pub fn dsn(&self) -> String {
        let mut parts = Vec::new();
        let mut push = |key: &str, value: &str| parts.push(format!("{key}={}", quote(value)));

        if let Some(host) = &self.host {
            push("host", host);
        }
        if let Some(port) = self.port {
            push("port", &port.to_string());
        }
        if let Some(database) = &self.database {
            push("dbname", database);
        }
        if let Some(username) = &self.username {
            push("user", username);
        }
        if let Some(password) = &self.password {
            push("password", password);
        }

        parts.join(" ")
    }

    fn from_map(key: &str, map: &serde_json::Map<String, Value>) -> Result<Self> {
        let field = |name: &str| -> Result<Option<String>> {
            match map.get(name) {
                Some(value) if !value.is_null() => as_string(key, value).map(Some),
                _ => Ok(None),
            }
        };

        Ok(Self {
            drivername: field("drivername")?,
            host: field("host")?,
            port: match map.get("port") {
                Some(value) if !value.is_null() => Some(as_u16(key, value)?),
                _ => None,
            },
            username: field("username")?.or(field("user")?),
            password: field("password")?,
            database: field("database")?.or(field("dbname")?),
        })
    }
}

fn quote(value: &str) -> String {
    if !value.is_empty() && !value.contains(|c: char| c.is_whitespace() || c == '\'' || c == '\\') {
        return value.to_string();
    }
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn looks_like_url(value: &str) -> bool {
    value.contains("://") || value.contains('=')
}

fn parse_target(key: &str, value: &Value) -> Result<ConnectionTarget> {
    match value {
        Value::String(url) => Ok(ConnectionTarget::Url(url.clone())),
        Value::Object(map) => match map.get("url") {
            Some(url) if !url.is_null() => parse_target(key, url),
            _ => Ok(ConnectionTarget::Params(ConnectionParams::from_map(key, map)?)),
        },
        other => Err(ConfigError::invalid(key, format!("expected a url or a map, got {other}"))),
    }
}

/// Reads the `connection` (or legacy `url`) value of a section.
pub(crate) fn connection_ref(stack: &ConfigStack<'_>) -> Result<Option<ConnectionRef>> {
    let (key, value) = match stack.value("connection") {
        Some(value) => ("connection", value),
        None => match stack.value("url") {
            Some(value) => ("url", value),
            None => return Ok(None),
        },
    };

    match value {
        Value::String(s) if !looks_like_url(s) => Ok(Some(ConnectionRef::Named(s.clone()))),
        value => Ok(Some(ConnectionRef::Inline(Connection {
            name: None,
            url: parse_target(key, value)?,
        }))),
    }
}

/// Reads the `connections` declarations, either a list of `{name, url}` or a keyed map.
pub(crate) fn connections(stack: &ConfigStack<'_>) -> Result<Vec<Connection>> {
    match stack.value("connections") {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, value)| {
                Ok(Connection {
                    name: Some(name.clone()),
                    url: parse_target("connections", value)?,
                })
            })
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let name = item
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ConfigError::invalid("connections", "every connection needs a `name`"))?;
                Ok(Connection {
                    name: Some(name.to_string()),
                    url: parse_target("connections", item)?,
                })
            })
            .collect(),
        Some(other) => Err(ConfigError::invalid(
            "connections",
            format!("expected a list or a map, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_render_a_dsn() {
        let params = ConnectionParams {
            host: Some("localhost".into()),
            port: Some(5432),
            database: Some("app".into()),
            username: Some("postgres".into()),
            password: Some("p w".into()),
            ..Default::default()
        };
        assert_eq!(
            params.dsn(),
            "host=localhost port=5432 dbname=app user=postgres password='p w'"
        );
    }

    #[test]
    fn dialect_comes_from_scheme_or_driver() {
        let url = Connection {
            name: None,
            url: ConnectionTarget::Url("postgresql+psycopg2://localhost/db".into()),
        };
        assert_eq!(url.dialect().as_deref(), Some("postgresql"));

        let params = Connection {
            name: None,
            url: ConnectionTarget::Params(ConnectionParams {
                drivername: Some("sqlite".into()),
                ..Default::default()
            }),
        };
        assert_eq!(params.dialect().as_deref(), Some("sqlite"));
    }

    #[test]
    fn map_with_url_key_is_a_url() {
        let target = parse_target("connection", &json!({"url": "foo"})).unwrap();
        assert_eq!(target, ConnectionTarget::Url("foo".into()));
    }
}
