//! Mount configuration

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables for opening and parsing disc images.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MountConfig {
    /// Additional open attempts after the first one fails.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_retry_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_retry_delay_ms: u64,
    /// Deepest directory traversal step before a subtree is abandoned.
    pub max_depth: u32,
    /// Open times above this many milliseconds per MiB are reported as slow.
    pub slow_load_ms_per_mib: u64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_retry_delay_ms: 100,
            max_retry_delay_ms: 2000,
            max_depth: 256,
            slow_load_ms_per_mib: 20,
        }
    }
}

impl MountConfig {
    /// Get the user config directory path
    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rusty-gdfx"))
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        Self::user_config_dir().map(|dir| dir.join("config.json"))
    }

    /// Load configuration from config.json.
    ///
    /// Looks in the user config directory, then the current directory, then
    /// next to the executable. Falls back to defaults.
    pub fn load() -> Self {
        if let Some(user_config) = Self::user_config_path() {
            if let Ok(config) = Self::load_from_path(&user_config) {
                return config;
            }
        }

        if let Ok(config) = Self::load_from_path("config.json") {
            return config;
        }

        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                if let Ok(config) = Self::load_from_path(exe_dir.join("config.json")) {
                    return config;
                }
            }
        }

        Self::default()
    }

    /// Save configuration to the user config directory.
    pub fn save(&self) -> Result<()> {
        let config_dir =
            Self::user_config_dir().context("could not determine user config directory")?;
        self.save_to_path(config_dir.join("config.json"))
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: MountConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = MountConfig {
            max_retries: 2,
            max_depth: 64,
            ..MountConfig::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(MountConfig::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: MountConfig = serde_json::from_str(r#"{ "max_retries": 9 }"#).unwrap();
        assert_eq!(config.max_retries, 9);
        assert_eq!(config.max_depth, 256);
        assert_eq!(config.max_retry_delay_ms, 2000);
    }

    #[test]
    fn test_load_from_bad_path_reports_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        let err = MountConfig::load_from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }
}
