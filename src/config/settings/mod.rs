
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "search-provider";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Logical connection name to store connection string
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub request_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid connection name: '{0}' (cannot be empty or contain '=' or ';')")]
    InvalidConnectionName(String),
    #[error("Connection string for '{0}' cannot be empty")]
    EmptyConnectionString(String),
    #[error("Invalid max results: {0} (must be between 1 and 1000)")]
    InvalidMaxResults(u32),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidRequestTimeout(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Platform configuration directory for this application
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the platform configuration directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to locate config directory")?;
        Self::load(config_dir)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, connection_string) in &self.connections {
            validate_connection_entry(name, connection_string)?;
        }
        self.search.validate()?;
        self.store.validate()?;
        Ok(())
    }

    /// Add or replace a named connection string
    #[inline]
    pub fn set_connection(
        &mut self,
        name: String,
        connection_string: String,
    ) -> Result<(), ConfigError> {
        validate_connection_entry(&name, &connection_string)?;
        self.connections.insert(name, connection_string);
        Ok(())
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.store.request_timeout_seconds)
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.max_results) {
            return Err(ConfigError::InvalidMaxResults(self.max_results));
        }
        Ok(())
    }

    pub fn set_max_results(&mut self, max_results: u32) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&max_results) {
            return Err(ConfigError::InvalidMaxResults(max_results));
        }
        self.max_results = max_results;
        Ok(())
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=600).contains(&self.request_timeout_seconds) {
            return Err(ConfigError::InvalidRequestTimeout(
                self.request_timeout_seconds,
            ));
        }
        Ok(())
    }

    pub fn set_request_timeout_seconds(&mut self, seconds: u64) -> Result<(), ConfigError> {
        if !(1..=600).contains(&seconds) {
            return Err(ConfigError::InvalidRequestTimeout(seconds));
        }
        self.request_timeout_seconds = seconds;
        Ok(())
    }
}

fn validate_connection_entry(name: &str, connection_string: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() || name.contains('=') || name.contains(';') {
        return Err(ConfigError::InvalidConnectionName(name.to_string()));
    }
    if connection_string.trim().is_empty() {
        return Err(ConfigError::EmptyConnectionString(name.to_string()));
    }
    Ok(())
}
