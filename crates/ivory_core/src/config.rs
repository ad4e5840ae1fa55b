//! Application configuration.
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables prefixed with `IVORY_` and using `__` between nested keys,
//! e.g. `IVORY_POSTGRES__HOST=db.internal`.

use crate::error::IvoryError;
use crate::models::{ConnectionConfig, ConnectionOptions};
use crate::services::BackupTools;

use config::{Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "local.yaml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "IVORY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Logging and shutdown
    pub app: AppSettings,
    /// The administered database
    pub postgres: PostgresSettings,
    /// HTTP listener
    pub server: ServerSettings,
    /// Backup directory and client tools
    pub backup: BackupSettings,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// `debug`, `info`, `warn` or `error`; any `EnvFilter` directive works
    pub log_level: String,
    /// Write daily rolling log files here when set
    pub log_dir: Option<PathBuf>,
    /// Upper bound on graceful shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// The administered database.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    /// Server hostname or IP
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database to administer
    pub database: String,
    /// Login username
    pub username: String,
    /// Login password; empty means none
    pub password: String,
    /// Connection tries at startup before giving up
    pub connection_attempts: u32,
    /// Pause between failed startup connection tries
    #[serde(with = "humantime_serde")]
    pub delay_between_attempts: Duration,
    /// Timeout for establishing one connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Server-side statement timeout; unset means none
    #[serde(with = "humantime_serde")]
    pub query_timeout: Option<Duration>,
    /// Maximum pooled connections
    pub pool_size: usize,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        let options = ConnectionOptions::default();
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            connection_attempts: options.connection_attempts,
            delay_between_attempts: options.delay_between_attempts,
            connect_timeout: Duration::from_secs(options.connect_timeout_secs as u64),
            query_timeout: None,
            pool_size: options.pool_size,
        }
    }
}

impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("connection_attempts", &self.connection_attempts)
            .field("delay_between_attempts", &self.delay_between_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl PostgresSettings {
    /// Build the connection configuration. The password is not included.
    pub fn connection_config(&self) -> ConnectionConfig {
        let options = ConnectionOptions {
            connect_timeout_secs: self.connect_timeout.as_secs().max(1) as u32,
            statement_timeout: self.query_timeout.filter(|t| !t.is_zero()),
            pool_size: self.pool_size,
            connection_attempts: self.connection_attempts,
            delay_between_attempts: self.delay_between_attempts,
            ..ConnectionOptions::default()
        };

        ConnectionConfig::new(&self.host, &self.database, &self.username)
            .with_port(self.port)
            .with_options(options)
    }

    /// The password, if one is configured.
    pub fn password(&self) -> Option<&str> {
        Some(self.password.as_str()).filter(|p| !p.is_empty())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Per-request timeout; unset means none
    #[serde(with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, read_timeout: None }
    }
}

impl ServerSettings {
    /// `host:port` for binding the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Backup storage and client tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Default backup directory
    pub dir: Option<PathBuf>,
    /// `pg_dump` binary, looked up on `PATH` when bare
    pub pg_dump_path: PathBuf,
    /// `psql` binary, looked up on `PATH` when bare
    pub psql_path: PathBuf,
}

impl Default for BackupSettings {
    fn default() -> Self {
        let tools = BackupTools::default();
        Self { dir: None, pg_dump_path: tools.pg_dump, psql_path: tools.psql }
    }
}

impl BackupSettings {
    /// The configured client tool paths.
    pub fn tools(&self) -> BackupTools {
        BackupTools { pg_dump: self.pg_dump_path.clone(), psql: self.psql_path.clone() }
    }
}

impl AppConfig {
    /// Load from `path` (or [`DEFAULT_CONFIG_FILE`]) and the process environment.
    ///
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self, IvoryError> {
        Self::load_from(path, None)
    }

    /// Load with an explicit environment map instead of the process environment.
    pub fn load_from(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, IvoryError> {
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let settings = config::Config::builder()
            .add_source(File::from(file.as_path()).format(FileFormat::Yaml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that cannot be defaulted sensibly.
    pub fn validate(&self) -> Result<(), IvoryError> {
        self.postgres.connection_config().validate().map_err(IvoryError::config)?;
        if self.server.host.is_empty() {
            return Err(IvoryError::config("server host is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load_from(None, Some(env(&[]))).unwrap();
        assert_eq!(config.postgres.port, 5432);
        assert_eq!(config.server.address(), "0.0.0.0:8080");
        assert_eq!(config.app.shutdown_timeout, Duration::from_secs(10));
        assert!(config.backup.dir.is_none());
        assert_eq!(config.backup.tools(), BackupTools::default());
    }

    #[test]
    fn test_yaml_file_with_durations() {
        let file = yaml(
            r#"
app:
  log_level: debug
  shutdown_timeout: 3s
postgres:
  host: db.internal
  database: shop
  username: admin
  password: s3cret
  connection_attempts: 3
  delay_between_attempts: 500ms
  query_timeout: 1m
server:
  port: 9000
  read_timeout: 15s
backup:
  dir: /srv/backups
"#,
        );

        let config = AppConfig::load_from(Some(file.path()), Some(env(&[]))).unwrap();
        assert_eq!(config.app.log_level, "debug");
        assert_eq!(config.app.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.postgres.delay_between_attempts, Duration::from_millis(500));
        assert_eq!(config.server.read_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.backup.dir, Some(PathBuf::from("/srv/backups")));

        let connection = config.postgres.connection_config();
        assert_eq!(connection.display_url(), "postgresql://admin@db.internal:5432/shop");
        assert_eq!(connection.options.connection_attempts, 3);
        assert_eq!(connection.options.statement_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = yaml("postgres:\n  host: from-file\n  port: 5433\n");

        let config = AppConfig::load_from(
            Some(file.path()),
            Some(env(&[
                ("IVORY_POSTGRES__HOST", "from-env"),
                ("IVORY_SERVER__PORT", "9999"),
                ("IVORY_BACKUP__PG_DUMP_PATH", "/opt/pg/bin/pg_dump"),
            ])),
        )
        .unwrap();

        assert_eq!(config.postgres.host, "from-env");
        assert_eq!(config.postgres.port, 5433);
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.backup.pg_dump_path, PathBuf::from("/opt/pg/bin/pg_dump"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from(Some(&dir.path().join("absent.yaml")), Some(env(&[])))
            .unwrap_err();
        assert_eq!(err.category(), "Config");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = yaml("postgres:\n  database: \"\"\n");
        assert!(AppConfig::load_from(Some(file.path()), Some(env(&[]))).is_err());

        let file = yaml("postgres:\n  port: not-a-port\n");
        assert!(AppConfig::load_from(Some(file.path()), Some(env(&[]))).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = PostgresSettings { password: "s3cret".into(), ..Default::default() };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(settings.password(), Some("s3cret"));
        assert_eq!(PostgresSettings::default().password(), None);
    }
}
