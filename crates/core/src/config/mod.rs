//! Engine configuration
//!
//! TOML-backed settings for the permission engine:
//! - cache TTL and sweep interval
//! - the fallback default rank created on first start
//! - native sync queue
//!
//! # Example
//!
//! ```toml
//! version = 1
//! debug = false
//!
//! [cache]
//! ttl_secs = 300
//! cleanup_interval_secs = 60
//!
//! [default_rank]
//! name = "default"
//! display_name = "Default"
//! color = "#FFFFFF"
//! priority = 0
//! permissions = ["chat.send"]
//!
//! [sync]
//! enabled = true
//! queue_capacity = 1024
//! ```

mod loader;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::permissions::DEFAULT_TTL;
use crate::ranks::DEFAULT_COLOR;
use crate::sync::DEFAULT_QUEUE_CAPACITY;

pub use loader::{base_dir, configs_dir, engine_config_path, CONFIG_FILE_NAME, HOME_ENV};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Could not determine the config directory
    #[error("Config directory not available - could not resolve base path")]
    NoConfigDirectory,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Player permission cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a cached player permission set stays valid
    pub ttl_secs: u64,
    /// Seconds between sweeps of expired entries
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL.as_secs(),
            cleanup_interval_secs: 60,
        }
    }
}

/// Rank created and flagged default when storage has no default rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultRankConfig {
    pub name: String,
    pub display_name: String,
    pub prefix: Option<String>,
    pub color: String,
    pub priority: i32,
    /// Permissions granted when the rank is first created
    pub permissions: Vec<String>,
}

impl Default for DefaultRankConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            display_name: "Default".to_string(),
            prefix: None,
            color: DEFAULT_COLOR.to_string(),
            priority: 0,
            permissions: Vec::new(),
        }
    }
}

/// Native sync settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Mirror changes into the host permission system
    pub enabled: bool,
    /// Queued calls before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Engine configuration.
///
/// Loaded from `{base}/configs/rankguard.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    pub cache: CacheConfig,

    pub default_rank: DefaultRankConfig,

    pub sync: SyncConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debug: false,
            cache: CacheConfig::default(),
            default_rank: DefaultRankConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from the default path, creating a default file if missing.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&engine_config_path()?)
    }

    /// Save config to the default path.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&engine_config_path()?)
    }

    /// Reload config from the default path.
    pub fn reload(&mut self) -> ConfigResult<()> {
        let path = engine_config_path()?;
        let content = std::fs::read_to_string(&path)?;
        *self = toml::from_str(&content)?;
        tracing::debug!("Reloaded engine config from {:?}", path);
        Ok(())
    }

    /// Load config from `path`, creating a default file there if missing.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded engine config from {:?}", path);
            Ok(config)
        } else {
            let default = Self::default();
            default.save_to(path)?;
            tracing::info!("Created default engine config at {:?}", path);
            Ok(default)
        }
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved engine config to {:?}", path);
        Ok(())
    }

    /// Player cache TTL
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Interval between expired-entry sweeps
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_interval_secs.max(1))
    }
}
