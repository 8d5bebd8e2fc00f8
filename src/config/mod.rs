//! Configuration management for fetchgate

pub mod schema;

pub use schema::Config;

use crate::cache::FsCache;
use crate::error::{FetchError, FetchResult};
use crate::fetch::FetchOptions;
use crate::trust::TrustConfig;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fetchgate")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> FetchResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> FetchResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| FetchError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> FetchResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            FetchError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> FetchResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Cache root from config, or the platform default
    pub fn cache_root(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(FsCache::default_root)
    }

    /// Open the cache handle for this session
    pub fn open_cache(&self) -> FetchResult<FsCache> {
        if !self.cache.enabled {
            debug!("Image cache disabled by configuration");
            return Ok(FsCache::disabled());
        }
        let root = self.cache_root();
        FsCache::open(&root).map_err(|e| FetchError::User(format!(
            "Unable to open image cache at {}: {}",
            root.display(),
            e
        )))
    }

    /// Orchestrator options derived from `[fetch]`
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            strict_hash: self.fetch.strict_hash,
            tmp_dir: self
                .fetch
                .tmp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            copy_mode: self.fetch.copy_mode,
        }
    }

    /// Key lookup settings derived from `[trust]`
    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig {
            keyserver_url: self
                .trust
                .use_keyserver
                .then(|| self.trust.keyserver_url.clone()),
        }
    }
}
