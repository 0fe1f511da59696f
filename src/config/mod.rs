//! Settings for the mirror.
//!
//! Read from a TOML file, resolved in order: an explicit path (the
//! `--config` flag), `$FEDIMIRROR_CONFIG`, then
//! `~/.config/fedimirror/config.toml`.

pub mod account;

pub use account::{Account, SourceAccount};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::harvest::scheduler::parse_interval;

pub const ENV_CONFIG_PATH: &str = "FEDIMIRROR_CONFIG";

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.twitter.com/2";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub harvest: HarvestSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub domain: String,
    pub public_base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Duration string such as "30s", "15m", "1h", "1d", or raw seconds.
    pub interval: String,
    pub lookback_days: u32,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub upstream_base_url: String,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            interval: "15m".to_string(),
            lookback_days: 7,
            max_attempts: 3,
            retry_base_ms: 500,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
        }
    }
}

impl HarvestSettings {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.interval)
            .map(Duration::from_secs)
            .map_err(ConfigError::Invalid)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    pub path: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_page_size() -> usize {
    20
}

impl Settings {
    /// Load from an explicit path, `$FEDIMIRROR_CONFIG`, or the default location.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var(ENV_CONFIG_PATH) {
                Ok(p) => PathBuf::from(p),
                Err(_) => Self::default_config_path()?,
            },
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        settings.server.public_base_url = settings
            .server
            .public_base_url
            .trim_end_matches('/')
            .to_string();
        settings.validate()?;
        Ok(settings)
    }

    /// Get the default config file path: `~/.config/fedimirror/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("fedimirror").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.domain.trim().is_empty() {
            return Err(ConfigError::Invalid("server.domain is empty".into()));
        }
        if self.server.public_base_url.is_empty() {
            return Err(ConfigError::Invalid("server.public_base_url is empty".into()));
        }
        url::Url::parse(&self.server.public_base_url).map_err(|e| {
            ConfigError::Invalid(format!("server.public_base_url is not a URL: {}", e))
        })?;
        if self.server.page_size == 0 {
            return Err(ConfigError::Invalid("server.page_size must be positive".into()));
        }
        if self.harvest.interval()?.is_zero() {
            return Err(ConfigError::Invalid("harvest.interval must be positive".into()));
        }
        if self.harvest.max_attempts == 0 {
            return Err(ConfigError::Invalid("harvest.max_attempts must be at least 1".into()));
        }
        if self.accounts.is_empty() {
            return Err(ConfigError::Invalid("no accounts are configured".into()));
        }

        let mut ids = HashSet::new();
        let mut usernames = HashSet::new();
        for account in &self.accounts {
            if !ids.insert(account.id) {
                return Err(ConfigError::Invalid(format!(
                    "account id {} is used more than once",
                    account.id
                )));
            }
            if account.username.is_empty() || !usernames.insert(account.username.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "account username '{}' is empty or duplicated",
                    account.username
                )));
            }
            if account.source.handle.is_empty() || account.source.token.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "account {} is missing source handle or token",
                    account.username
                )));
            }
        }

        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database.path {
            Some(p) => Ok(p.clone()),
            None => Ok(Self::data_dir()?.join("fedimirror.db")),
        }
    }

    pub fn storage_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.path {
            Some(p) => Ok(p.clone()),
            None => Ok(Self::data_dir()?.join("storage")),
        }
    }

    fn data_dir() -> Result<PathBuf, ConfigError> {
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(data_dir.join("fedimirror"))
    }

    pub fn account_by_username(&self, username: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.username == username)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config or data directory")]
    NoConfigDir,

    #[error("Failed to read config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
