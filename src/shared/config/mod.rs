//! Application configuration module
//!
//! Provides configuration types for the synchronization core. Values come from
//! the builder, a TOML file, or both (file first, builder overrides).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Cache key the members view is persisted under
pub const DEFAULT_MEMBERS_CACHE_KEY: &str = "ccms_members";
pub const DEFAULT_RECENT_POSTS_LIMIT: usize = 3;
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 5;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for the on-disk cache; platform data dir when unset
    pub cache_dir: Option<PathBuf>,
    /// Key the members view is cached under
    pub members_cache_key: String,
    /// How many recent posts the aggregator keeps
    pub recent_posts_limit: usize,
    /// How many post notifications are shown
    pub notification_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            members_cache_key: DEFAULT_MEMBERS_CACHE_KEY.to_owned(),
            recent_posts_limit: DEFAULT_RECENT_POSTS_LIMIT,
            notification_limit: DEFAULT_NOTIFICATION_LIMIT,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.members_cache_key.trim().is_empty() {
            return Err(ConfigError::MissingValue("members_cache_key"));
        }
        if self.recent_posts_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "recent_posts_limit",
                message: "must be at least 1".to_owned(),
            });
        }
        if self.notification_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notification_limit",
                message: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    base: Option<AppConfig>,
    cache_dir: Option<PathBuf>,
    members_cache_key: Option<String>,
    recent_posts_limit: Option<usize>,
    notification_limit: Option<usize>,
}

impl AppConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from a file)
    pub fn base(mut self, config: AppConfig) -> Self {
        self.base = Some(config);
        self
    }

    /// Set the cache directory
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn members_cache_key(mut self, key: impl Into<String>) -> Self {
        self.members_cache_key = Some(key.into());
        self
    }

    pub fn recent_posts_limit(mut self, limit: usize) -> Self {
        self.recent_posts_limit = Some(limit);
        self
    }

    pub fn notification_limit(mut self, limit: usize) -> Self {
        self.notification_limit = Some(limit);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let mut config = self.base.unwrap_or_default();
        if let Some(dir) = self.cache_dir {
            config.cache_dir = Some(dir);
        }
        if let Some(key) = self.members_cache_key {
            config.members_cache_key = key;
        }
        if let Some(limit) = self.recent_posts_limit {
            config.recent_posts_limit = limit;
        }
        if let Some(limit) = self.notification_limit {
            config.notification_limit = limit;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("could not read config: {0}")]
    Io(String),
    #[error("could not parse config: {0}")]
    Parse(String),
}
