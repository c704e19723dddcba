//! Service configuration.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! environment variables prefixed with `REVIEWER__` (nested keys joined by
//! `__`, e.g. `REVIEWER__HTTP_SERVER__PORT=9090`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Deployment environment. Selects the log format and default level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    #[default]
    Local,
    Dev,
    Prod,
}

/// Which store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    /// Process memory; everything is lost on exit.
    Memory,
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub env: Env,

    #[serde(default)]
    pub datasource: DatasourceConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a connection waits on a locked database.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

impl HttpServerConfig {
    /// `host:port` to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/reviewer-service.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    30
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    5
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("REVIEWER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.env, Env::Local);
        assert_eq!(settings.datasource.kind, StoreKind::Sqlite);
        assert_eq!(settings.datasource.max_connections, 5);
        assert_eq!(settings.http_server.listen_addr(), "0.0.0.0:8080");
        assert_eq!(settings.http_server.timeout_secs, 5);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "env: prod\ndatasource:\n  kind: memory\nhttp_server:\n  port: 9091\n"
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.env, Env::Prod);
        assert_eq!(settings.datasource.kind, StoreKind::Memory);
        assert_eq!(settings.http_server.port, 9091);
        // Untouched keys keep their defaults
        assert_eq!(settings.http_server.host, "0.0.0.0");
        assert_eq!(settings.datasource.busy_timeout_secs, 30);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/reviewer.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_environment_overrides() {
        std::env::set_var("REVIEWER__DATASOURCE__MAX_CONNECTIONS", "11");

        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.datasource.max_connections, 11);

        std::env::remove_var("REVIEWER__DATASOURCE__MAX_CONNECTIONS");
    }
}
