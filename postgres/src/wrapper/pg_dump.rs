use log::{debug, info};
use std::process::Stdio;
use tokio::process::Command;
use tokio_postgres::config::Host;
use tokio_postgres::Config;

use crate::{PostgresError, Result};

/// Options for a schema-only pg_dump run
#[derive(Debug, Clone)]
pub struct PgDumpOptions {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub schema_only: bool,
    pub no_comments: bool,
    pub schemas: Vec<String>,
    pub tables: Vec<String>,
    pub exclude_tables: Vec<String>,
}

impl Default for PgDumpOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: None,
            password: None,
            database: "postgres".to_string(),
            schema_only: true,
            no_comments: true,
            schemas: Vec::new(),
            tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

impl PgDumpOptions {
    /// Connection options taken from an already parsed session config.
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let host = match config.get_hosts().first() {
            Some(Host::Tcp(host)) => host.clone(),
            #[cfg(unix)]
            Some(Host::Unix(path)) => path.display().to_string(),
            None => defaults.host.clone(),
        };

        Self {
            host,
            port: config.get_ports().first().copied().unwrap_or(defaults.port),
            username: config.get_user().map(str::to_string),
            password: config
                .get_password()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
            database: config
                .get_dbname()
                .or(config.get_user())
                .unwrap_or(&defaults.database)
                .to_string(),
            ..defaults
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--dbname".to_string(),
            self.database.clone(),
            "--no-password".to_string(),
        ];

        if let Some(username) = &self.username {
            args.push("--username".to_string());
            args.push(username.clone());
        }
        if self.schema_only {
            args.push("--schema-only".to_string());
        }
        if self.no_comments {
            args.push("--no-comments".to_string());
        }
        for schema in &self.schemas {
            args.push(format!("--schema={schema}"));
        }
        for table in &self.tables {
            args.push(format!("--table={table}"));
        }
        for table in &self.exclude_tables {
            args.push(format!("--exclude-table={table}"));
        }

        args
    }
}

/// Wrapper for pg_dump command
pub struct PgDump;

impl PgDump {
    /// Runs pg_dump and returns its cleaned stdout.
    pub async fn run(options: &PgDumpOptions) -> Result<Vec<u8>> {
        let mut cmd = Command::new("pg_dump");
        cmd.args(options.args())
            .env("PGPASSWORD", options.password.as_deref().unwrap_or_default())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running pg_dump with {:?}", options.args());

        let output = cmd.output().await.map_err(|e| PostgresError::Transport {
            tool: "pg_dump".to_string(),
            stderr: format!("Failed to execute pg_dump: {e}"),
        })?;

        if !output.status.success() {
            return Err(PostgresError::Transport {
                tool: "pg_dump".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!("pg_dump wrote {} bytes", output.stdout.len());
        Ok(clean_sql(&output.stdout))
    }

    /// Check if pg_dump is available in the system
    pub fn check_availability() -> Result<()> {
        let path = which::which("pg_dump").map_err(|e| PostgresError::Transport {
            tool: "pg_dump".to_string(),
            stderr: format!("pg_dump is not available: {e}"),
        })?;
        info!("Using pg_dump at {}", path.display());
        Ok(())
    }
}

/// Strips comments, session settings, psql meta-commands and blank lines from a dump.
pub fn clean_sql(sql: &[u8]) -> Vec<u8> {
    const SKIPPED: [&[u8]; 4] = [b"--", b"SET", b"SELECT pg_catalog", b"\\"];

    sql.split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty() && !SKIPPED.iter().any(|prefix| line.starts_with(prefix)))
        .collect::<Vec<_>>()
        .join(&b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn clean_sql_keeps_statements_only() {
        let dump = b"--\n-- PostgreSQL database dump\n--\n\\restrict abc\nSET statement_timeout = 0;\nSELECT pg_catalog.set_config('search_path', '', false);\n\nCREATE TABLE public.store (\n    id integer\n);\n";
        assert_eq!(
            String::from_utf8(clean_sql(dump)).unwrap(),
            "CREATE TABLE public.store (\n    id integer\n);"
        );
    }

    #[test]
    fn options_follow_the_session_config() {
        let config = Config::from_str("postgresql://me:pw@db:6000/app").unwrap();
        let mut options = PgDumpOptions::from_config(&config);
        options.tables.push("public.store".to_string());

        assert_eq!(options.password.as_deref(), Some("pw"));
        let args = options.args();
        assert!(args.windows(2).any(|w| w == ["--port", "6000"]));
        assert!(args.windows(2).any(|w| w == ["--username", "me"]));
        assert!(args.contains(&"--schema-only".to_string()));
        assert!(args.contains(&"--table=public.store".to_string()));
    }
}
