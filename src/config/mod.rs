//! Configuration management for bubblewatch
//!
//! Loads the TOML configuration file, applies profile and environment
//! overrides, and validates the result before anything else starts.

use crate::error::{BubbleError, Result};
use crate::history::RetentionPolicy;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// Defaults for the user settings record
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Daemon configuration for the IPC server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub max_connections: usize,
}

/// Timers of the per-context analysis loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub analysis_interval: String,
    pub scroll_debounce: String,
    pub action_cooldown: String,
    pub action_delay: String,
    /// Capacity of the report broadcast channel
    pub report_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            analysis_interval: "5s".to_string(),
            scroll_debounce: "750ms".to_string(),
            action_cooldown: "15s".to_string(),
            action_delay: "3s".to_string(),
            report_buffer: 64,
        }
    }
}

/// Keyword history retention and query defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_age: String,
    pub max_entries: usize,
    pub default_window: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_age: "7d".to_string(),
            max_entries: 3000,
            default_window: "1h".to_string(),
        }
    }
}

impl HistoryConfig {
    pub fn retention(&self) -> Result<RetentionPolicy> {
        let max_age = parse_duration(&self.max_age).ok_or_else(|| {
            BubbleError::InvalidConfigValue {
                path: "history.max_age".to_string(),
                message: format!("Invalid duration: {}", self.max_age),
            }
        })?;
        Ok(RetentionPolicy {
            max_age_ms: duration_ms(max_age),
            max_entries: self.max_entries,
        })
    }

    pub fn default_window_ms(&self) -> Result<i64> {
        parse_duration(&self.default_window)
            .map(duration_ms)
            .ok_or_else(|| BubbleError::InvalidConfigValue {
                path: "history.default_window".to_string(),
                message: format!("Invalid duration: {}", self.default_window),
            })
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_explore: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_interval: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BubbleError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BubbleError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load the file at `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(BubbleError::ConfigNotFound { .. }) => {
                tracing::debug!("No config at {:?}, using defaults", path);
                let mut config = Self::default();
                config.apply_env_overrides();
                ConfigValidator::validate(&config)?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BubbleError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| BubbleError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| BubbleError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(sensitivity) = overrides.sensitivity {
            self.settings.sensitivity = sensitivity;
        }
        if let Some(auto_explore) = overrides.auto_explore {
            self.settings.auto_explore = auto_explore;
        }
        if let Some(interval) = overrides.analysis_interval {
            self.monitor.analysis_interval = interval;
        }
        tracing::debug!("Applied profile {}", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: BUBBLEWATCH_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("BUBBLEWATCH_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "SETTINGS__SENSITIVITY" => {
                self.settings.sensitivity =
                    value.parse().map_err(|_| BubbleError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as number", value),
                    })?;
            }
            "SETTINGS__AUTO_EXPLORE" => {
                self.settings.auto_explore =
                    value.parse().map_err(|_| BubbleError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as boolean", value),
                    })?;
            }
            "MONITOR__ANALYSIS_INTERVAL" => {
                self.monitor.analysis_interval = value.to_string();
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Socket path with `~` expanded
    pub fn socket_path(&self) -> PathBuf {
        expand_tilde(&self.daemon.socket_path)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| BubbleError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("bubblewatch").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.bubblewatch");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: data_dir.clone(),
            },
            daemon: DaemonConfig {
                socket_path: data_dir.join("daemon.sock"),
                max_connections: 10,
            },
            monitor: MonitorConfig::default(),
            history: HistoryConfig::default(),
            settings: Settings::default(),
            profiles: HashMap::new(),
        }
    }
}

/// Parse a duration such as `750ms`, `5s`, `10m`, `1h` or `7d`
///
/// A bare number is taken as seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    let millis = match unit.trim() {
        "ms" => Some(amount),
        "" | "s" => amount.checked_mul(1_000),
        "m" => amount.checked_mul(60_000),
        "h" => amount.checked_mul(3_600_000),
        "d" => amount.checked_mul(86_400_000),
        _ => None,
    }?;
    Some(Duration::from_millis(millis))
}

pub(crate) fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("750ms"), Some(Duration::from_millis(750)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("7d"), Some(Duration::from_secs(7 * 86_400)));
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("5w"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.settings.sensitivity = 0.65;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.settings.sensitivity, 0.65);
        assert_eq!(loaded.monitor.analysis_interval, "5s");
        assert_eq!(loaded.history.max_entries, 3000);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[_meta]
schema_version = "1.0.0"

[storage]
data_dir = "/tmp/bubblewatch"

[daemon]
socket_path = "/tmp/bubblewatch/daemon.sock"
max_connections = 4

[settings]
autoExplore = false
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.settings.auto_explore);
        assert_eq!(config.settings.sensitivity, 0.8);
        assert_eq!(config.monitor.scroll_debounce, "750ms");
        assert_eq!(config.history.default_window_ms().unwrap(), 3_600_000);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/bubblewatch.toml"));
        assert!(matches!(result, Err(BubbleError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "strict".to_string(),
            ProfileOverrides {
                sensitivity: Some(0.5),
                auto_explore: Some(false),
                analysis_interval: Some("2s".to_string()),
            },
        );

        config.apply_profile("strict").unwrap();
        assert_eq!(config.settings.sensitivity, 0.5);
        assert!(!config.settings.auto_explore);
        assert_eq!(config.monitor.analysis_interval, "2s");

        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_retention_from_history_config() {
        let retention = HistoryConfig::default().retention().unwrap();
        assert_eq!(retention, RetentionPolicy::default());
    }

    #[test]
    fn test_daemon_section_keys() {
        let encoded = toml::to_string_pretty(&Config::default()).unwrap();
        let value: toml::Value = toml::from_str(&encoded).unwrap();

        let mut keys: Vec<&str> = value["daemon"]
            .as_table()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["max_connections", "socket_path"]);
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(
            expand_tilde(Path::new("/var/lib/bubblewatch")),
            PathBuf::from("/var/lib/bubblewatch")
        );
    }
}
