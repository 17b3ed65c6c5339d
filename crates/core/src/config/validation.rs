//! Configuration validation rules.
//!
//! This module provides validation logic for `CacheConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::CacheConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `evict_after_days` is outside 1..=365
    /// - `evict_idle_hours` is outside 1..=720
    /// - `index_max_terms` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evict_after_days < 1 {
            return Err(ConfigError::Invalid {
                field: "evict_after_days".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.evict_after_days > 365 {
            return Err(ConfigError::Invalid {
                field: "evict_after_days".into(),
                reason: "must not exceed 365".into(),
            });
        }

        if self.evict_idle_hours < 1 {
            return Err(ConfigError::Invalid {
                field: "evict_idle_hours".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.evict_idle_hours > 720 {
            return Err(ConfigError::Invalid {
                field: "evict_idle_hours".into(),
                reason: "must not exceed 720 (30 days)".into(),
            });
        }

        if self.index_max_terms == 0 {
            return Err(ConfigError::Invalid {
                field: "index_max_terms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}
