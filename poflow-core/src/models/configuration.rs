//! Engine configuration data structures

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// How long cached workflow settings stay fresh (seconds)
    pub settings_cache_ttl_seconds: u64,
    /// Orders strictly below this amount auto-approve (whole KRW)
    pub auto_approval_threshold: i64,
    /// Pending approvals older than this many days count as urgent
    pub urgent_wait_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            settings_cache_ttl_seconds: 300, // 5 minutes
            auto_approval_threshold: 100_000,
            urgent_wait_days: 3,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).context("Failed to read engine config file")?;
            let config: EngineConfig =
                toml::from_str(&content).context("Failed to parse engine config TOML")?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(EngineConfig::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize engine config")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path, content).context("Failed to write engine config file")?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("poflow").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.settings_cache_ttl_seconds > 86_400 {
            errors.push("settings_cache_ttl_seconds cannot exceed 86400 (1 day)".to_string());
        }

        if self.auto_approval_threshold < 0 {
            errors.push("auto_approval_threshold must not be negative".to_string());
        }

        if !(1..=30).contains(&self.urgent_wait_days) {
            errors.push("urgent_wait_days must be between 1 and 30".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_configuration() {
        let config = EngineConfig::default();
        assert_eq!(config.settings_cache_ttl_seconds, 300);
        assert_eq!(config.auto_approval_threshold, 100_000);
        assert_eq!(config.urgent_wait_days, 3);
    }

    #[test]
    fn test_configuration_validation() {
        let config = EngineConfig {
            settings_cache_ttl_seconds: 172_800, // Invalid: too high
            auto_approval_threshold: -1,         // Invalid: negative
            urgent_wait_days: 0,                 // Invalid: below minimum
            ..EngineConfig::default()
        };

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("settings_cache_ttl_seconds")));
        assert!(errors.iter().any(|e| e.contains("auto_approval_threshold")));
        assert!(errors.iter().any(|e| e.contains("urgent_wait_days")));
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let config = EngineConfig {
            auto_approval_threshold: 50_000,
            ..EngineConfig::default()
        };

        // Save configuration
        config.save_to_file(&config_path).unwrap();
        assert!(config_path.exists());

        // Load configuration
        let loaded_config = EngineConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded_config.auto_approval_threshold, 50_000);
    }
}
