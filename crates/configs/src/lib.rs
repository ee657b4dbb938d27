//! # configs
//!
//! Layered settings: built-in defaults, then an optional `clipshare.toml`
//! (or the file named by `CLIPSHARE_CONFIG`), then `CLIPSHARE_*`
//! environment variables. Nested keys use a double underscore, e.g.
//! `CLIPSHARE_STORAGE__BACKEND=file`.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "CLIPSHARE";
pub const DEFAULT_CONFIG_FILE: &str = "clipshare";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which `SessionRepository` implementation to plug in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite document table; the durable backend.
    Sqlite,
    /// In-memory map flushed to `storage.data_file`.
    File,
    /// In-memory map, nothing persisted.
    Memory,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: Backend,
    pub database_url: SecretString,
    pub max_connections: u32,
    pub data_file: PathBuf,
    /// Records older than this are expired by the backend.
    pub retention_days: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            database_url: SecretString::from(String::from("sqlite://clipshare.db")),
            max_connections: 5,
            data_file: PathBuf::from("clipshare-sessions.json"),
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub code_attempts: u32,
    pub write_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            code_attempts: 10,
            write_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub sessions: SessionSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Reads `.env` (if present), then the layered sources.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let file = std::env::var(format!("{ENV_PREFIX}_CONFIG")).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::from_sources(config::File::with_name(&file).required(false), Self::environment())
    }

    /// Builds settings from an explicit file source and environment source.
    pub fn from_sources<F, E>(file: F, env: E) -> Result<Self, ConfigError>
    where
        F: config::Source + Send + Sync + 'static,
        E: config::Source + Send + Sync + 'static,
    {
        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions.code_attempts == 0 {
            return Err(ConfigError::Invalid("sessions.code_attempts must be at least 1".into()));
        }
        if self.sessions.write_attempts == 0 {
            return Err(ConfigError::Invalid("sessions.write_attempts must be at least 1".into()));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::Invalid("storage.max_connections must be at least 1".into()));
        }
        Ok(())
    }
}
