//! Configuration management for palhost.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Result refresh settings
    pub refresh: RefreshConfig,

    /// Generation backend settings
    pub ai: AiConfig,

    /// Dev plugin hot-reload settings
    pub dev: DevConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log filter used when `--verbose` is not given
    pub log_level: String,

    /// Plugin settings file (defaults to the data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_file: Option<PathBuf>,

    /// Whether notifications also go to the desktop
    pub desktop_notifications: bool,
}

/// Result refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Polling interval for streaming results, in milliseconds
    pub default_interval_ms: u64,
}

/// Generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Whether AI commands are enabled
    pub enabled: bool,

    /// Ollama server URL
    pub base_url: String,

    /// Model used when a command does not name one
    pub default_model: String,

    /// Give up on a stream after this many seconds without a delta.
    /// Unset means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_timeout_secs: Option<u64>,
}

/// Dev plugin hot-reload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevConfig {
    /// Quiet period after the last filesystem event before reloading
    pub debounce_ms: u64,

    /// Delay before the startup force-reload pass
    pub startup_reload_delay_secs: u64,

    /// Build output subdirectory that is watched and reloaded from
    pub dist_dir: String,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.palhost.toml` in current directory
    /// 2. `~/.config/palhost/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        // Try local config first
        let local_config = PathBuf::from(".palhost.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        // Try global config
        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        // Return defaults
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("palhost"))
    }

    /// Get the data directory path (for plugin settings).
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("palhost"))
    }

    /// Resolve the plugin settings file.
    pub fn settings_path(&self) -> Option<PathBuf> {
        self.general
            .settings_file
            .clone()
            .or_else(|| Self::data_dir().map(|d| d.join("settings.json")))
    }
}

impl AiConfig {
    /// Stall timeout as a duration.
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs.map(Duration::from_secs)
    }
}

impl DevConfig {
    /// Debounce window as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Startup grace period as a duration.
    pub fn startup_reload_delay(&self) -> Duration {
        Duration::from_secs(self.startup_reload_delay_secs)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { log_level: "warn".to_string(), settings_file: None, desktop_notifications: false }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { default_interval_ms: 100 }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama3.2".to_string(),
            stall_timeout_secs: None,
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self { debounce_ms: 2000, startup_reload_delay_secs: 5, dist_dir: "dist".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.refresh.default_interval_ms, 100);
        assert_eq!(config.dev.debounce(), Duration::from_secs(2));
        assert_eq!(config.dev.startup_reload_delay(), Duration::from_secs(5));
        assert_eq!(config.dev.dist_dir, "dist");
        assert!(config.ai.stall_timeout().is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[dev]"));
        assert!(!toml_str.contains("stall_timeout_secs"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [ai]
            default_model = "qwen2.5"
            stall_timeout_secs = 30

            [dev]
            debounce_ms = 500
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ai.default_model, "qwen2.5");
        assert_eq!(config.ai.stall_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.dev.debounce(), Duration::from_millis(500));
        // Untouched sections keep their defaults
        assert_eq!(config.dev.dist_dir, "dist");
        assert_eq!(config.refresh.default_interval_ms, 100);
    }

    #[test]
    fn test_settings_path_override() {
        let mut config = Config::default();
        config.general.settings_file = Some(PathBuf::from("/tmp/palhost-settings.json"));
        assert_eq!(config.settings_path(), Some(PathBuf::from("/tmp/palhost-settings.json")));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[refresh]\ndefault_interval_ms = 250\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.refresh.default_interval_ms, 250);
    }
}
