use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::client::cache::{FileStore, KeyValueStore, MembersCache};
use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

/// Overrides the cache directory
pub const CACHE_DIR_ENV: &str = "CLUBSYNC_CACHE_DIR";

/// Client configuration wrapper.
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut app = AppConfig::default();
        apply_env(&mut app);
        Self { app }
    }
}

fn apply_env(app: &mut AppConfig) {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|dir| !dir.is_empty()) {
        app.cache_dir = Some(PathBuf::from(dir));
    }
}

impl Config {
    /// Create a new configuration with default values and env overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Exactly what the builder produces, env ignored
    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self {
            app: builder.build()?,
        })
    }

    /// Load a TOML file, then apply env overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut app = AppConfig::from_toml_file(path)?;
        apply_env(&mut app);
        app.validate()?;
        Ok(Self { app })
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Directory the members cache lives in
    pub fn cache_dir(&self) -> PathBuf {
        match &self.app.cache_dir {
            Some(dir) => dir.clone(),
            None => FileStore::in_data_dir().dir().to_path_buf(),
        }
    }

    pub fn key_value_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(FileStore::new(self.cache_dir()))
    }

    /// Members cache on the configured store and key
    pub fn members_cache(&self) -> MembersCache {
        MembersCache::with_key(self.key_value_store(), self.app.members_cache_key.clone())
    }

    pub fn recent_posts_limit(&self) -> usize {
        self.app.recent_posts_limit
    }

    pub fn notification_limit(&self) -> usize {
        self.app.notification_limit
    }
}
