use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var naming the config file when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "SHELLRUN_CONFIG";

/// Env var that, when set, replaces the `database` section entirely.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

/// Deployment flavour. Selects log format and default verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Env {
    #[default]
    Dev,
    Prod,
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

/// Interpreter used to run command scripts: `<program> <arg> <script>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shell {
    pub program: String,
    pub arg: String,
}

impl Shell {
    pub fn new(program: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            arg: arg.into(),
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        if cfg!(windows) {
            Self::new("cmd", "/C")
        } else {
            Self::new("bash", "-c")
        }
    }
}

// ---------------------------------------------------------------------------
// HttpConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-request timeout; 0 disables it.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatabaseConfig {
    Url {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    Parts {
        #[serde(default = "default_db_host")]
        host: String,
        #[serde(default = "default_db_port")]
        port: u16,
        #[serde(default = "default_db_name")]
        database: String,
        #[serde(default = "default_db_user")]
        username: String,
        #[serde(default)]
        password: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "shellrun".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseConfig {
    /// Connection URL in `postgres://` form.
    pub fn url(&self) -> String {
        match self {
            DatabaseConfig::Url { url, .. } => url.clone(),
            DatabaseConfig::Parts {
                host,
                port,
                database,
                username,
                password,
                ..
            } => format!("postgres://{username}:{password}@{host}:{port}/{database}"),
        }
    }

    pub fn max_connections(&self) -> u32 {
        match self {
            DatabaseConfig::Url {
                max_connections, ..
            }
            | DatabaseConfig::Parts {
                max_connections, ..
            } => *max_connections,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub env: Env,
    #[serde(default)]
    pub shell: Shell,
    #[serde(default)]
    pub http: HttpConfig,
    /// Absent means the in-memory store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
}

impl Config {
    /// Resolve the config path: explicit path, then `SHELLRUN_CONFIG`, then
    /// `config/config.yaml` under the working directory.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Load from `path`. A missing file yields the defaults; a malformed one
    /// is an error. `DATABASE_URL` overrides the database section.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(data) => Self::from_yaml(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.is_empty() {
                config.database = Some(DatabaseConfig::Url {
                    url,
                    max_connections: config
                        .database
                        .as_ref()
                        .map(DatabaseConfig::max_connections)
                        .unwrap_or_else(default_max_connections),
                });
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shell.program.trim().is_empty() {
            return Err(Error::Config("shell.program must not be empty".into()));
        }
        if self.http.port == 0 {
            return Err(Error::Config("http.port must be non-zero".into()));
        }
        Ok(())
    }
}
