//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TILLCACHE_*)
//! 2. TOML config file (if TILLCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TILLCACHE_*)
/// 2. TOML config file (if TILLCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via TILLCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Records whose last ingestion is older than this many days become
    /// eviction candidates.
    ///
    /// Set via TILLCACHE_EVICT_AFTER_DAYS environment variable.
    #[serde(default = "default_evict_after_days")]
    pub evict_after_days: i64,

    /// Records not accessed within this many hours become eviction
    /// candidates.
    ///
    /// Set via TILLCACHE_EVICT_IDLE_HOURS environment variable.
    #[serde(default = "default_evict_idle_hours")]
    pub evict_idle_hours: i64,

    /// Maximum number of terms retained in the search index; the oldest
    /// entries are dropped first once the cap is exceeded.
    ///
    /// Set via TILLCACHE_INDEX_MAX_TERMS environment variable.
    #[serde(default = "default_index_max_terms")]
    pub index_max_terms: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tillcache.sqlite")
}

fn default_evict_after_days() -> i64 {
    7
}

fn default_evict_idle_hours() -> i64 {
    24
}

fn default_index_max_terms() -> usize {
    512
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            evict_after_days: default_evict_after_days(),
            evict_idle_hours: default_evict_idle_hours(),
            index_max_terms: default_index_max_terms(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TILLCACHE_`
    /// 2. TOML file from `TILLCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TILLCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TILLCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./tillcache.sqlite"));
        assert_eq!(config.evict_after_days, 7);
        assert_eq!(config.evict_idle_hours, 24);
        assert_eq!(config.index_max_terms, 512);
    }

    #[test]
    fn test_default_config_validates() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
    }
}
