use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ExpandResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub control: ControlConfig,
    pub log: LogConfig,
}

/// How long and how often to look for the comment widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Fallback poll in case a content change is never reported.
    pub check_interval_ms: u64,
    /// Capacity of the trigger queue feeding the engine.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted preferences. `None` keeps them in memory.
    pub dir: Option<PathBuf>,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub page_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_wait_ms: 30_000,
        }
    }
}

impl DiscoveryConfig {
    /// Never zero, even on a config that skipped [`Config::validate`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 2000,
            queue_capacity: 64,
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_dir().map(|d| d.join("coral-expand")),
            scope: "sync".to_string(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            page_host: "ft.com".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "coral_expand=info".to_string(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("coral-expand")
            .join("config.toml")
    }

    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`. Unreadable or unparsable files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        Self::try_load_from(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Load and validate config from `path`, reporting why it could not be used.
    pub fn try_load_from(path: &Path) -> ExpandResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    /// Clamp timing values and queue sizes to workable ranges
    pub fn validate(&mut self) {
        self.discovery.poll_interval_ms = self.discovery.poll_interval_ms.clamp(50, 10_000);
        self.discovery.max_wait_ms = self
            .discovery
            .max_wait_ms
            .clamp(self.discovery.poll_interval_ms, 600_000);

        self.monitor.check_interval_ms = self.monitor.check_interval_ms.clamp(250, 60_000);
        self.monitor.queue_capacity = self.monitor.queue_capacity.clamp(8, 4096);

        if self.storage.scope.trim().is_empty() {
            self.storage.scope = StorageConfig::default().scope;
        }
    }

    /// Save config to `path`, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> ExpandResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Save config to the default location
    pub fn save(&self) -> ExpandResult<()> {
        self.save_to(&Self::config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExpandError;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.discovery.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.discovery.max_wait(), Duration::from_secs(30));
        assert_eq!(config.monitor.check_interval(), Duration::from_secs(2));
        assert_eq!(config.storage.scope, "sync");
        assert_eq!(config.control.page_host, "ft.com");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("nope.toml"));
        assert_eq!(config.monitor.check_interval_ms, 2000);
    }

    #[test]
    fn test_partial_file_and_clamping() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[discovery]\npoll_interval_ms = 1\nmax_wait_ms = 0\n\n[monitor]\ncheck_interval_ms = 999999\n",
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.discovery.poll_interval_ms, 50);
        assert_eq!(config.discovery.max_wait_ms, 50);
        assert_eq!(config.monitor.check_interval_ms, 60_000);
        assert_eq!(config.monitor.queue_capacity, 64);
    }

    #[test]
    fn test_garbage_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.discovery.poll_interval_ms, 500);
    }

    #[test]
    fn test_try_load_reports_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let err = Config::try_load_from(&path).unwrap_err();
        assert!(matches!(err, ExpandError::Io(_)));

        fs::write(&path, "[monitor]\ncheck_interval_ms = \"soon\"\n").unwrap();
        let err = Config::try_load_from(&path).unwrap_err();
        assert!(matches!(err, ExpandError::TomlParse(_)));
    }

    #[test]
    fn test_validate_hand_built_config() {
        let mut config = Config::default();
        config.discovery.poll_interval_ms = 0;
        config.discovery.max_wait_ms = 0;
        config.monitor.check_interval_ms = 0;
        config.monitor.queue_capacity = 0;
        config.storage.scope = "  ".to_string();

        assert_eq!(config.discovery.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.monitor.check_interval(), Duration::from_millis(1));

        config.validate();
        assert_eq!(config.discovery.poll_interval_ms, 50);
        assert_eq!(config.discovery.max_wait_ms, 50);
        assert_eq!(config.monitor.check_interval_ms, 250);
        assert_eq!(config.monitor.queue_capacity, 8);
        assert_eq!(config.storage.scope, "sync");
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.control.page_host = "example.org".to_string();
        config.storage.dir = Some(temp_dir.path().join("data"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.control.page_host, "example.org");
        assert_eq!(loaded.storage.dir, Some(temp_dir.path().join("data")));
    }
}
