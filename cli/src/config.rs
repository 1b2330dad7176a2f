// Configuration management for the StoryKeep CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/storykeep/config.json
// - Linux: ~/.config/storykeep/config.json
// - Windows: %APPDATA%\storykeep\config.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use storykeep_core::api::DEFAULT_BASE_URL;
use storykeep_core::{ClientConfig, ControllerConfig, ErrorPolicy, ManagerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Story API base URL
    pub api_base_url: String,

    /// Local store directory (None = platform data dir)
    pub storage_path: Option<String>,

    /// Surface storage errors instead of degrading to empty results
    pub strict_storage: bool,

    /// Wait after a connectivity change before reloading
    pub settle_delay_ms: u64,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            storage_path: None,
            strict_storage: false,
            settle_delay_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("storykeep");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("storykeep");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    fn load_from(config_file: &Path) -> Result<Self> {
        if config_file.exists() {
            let contents =
                std::fs::read_to_string(config_file).context("Failed to read config file")?;
            Self::from_json(&contents)
        } else {
            let config = Config::default();
            config.save_to(config_file)?;
            Ok(config)
        }
    }

    fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    fn save_to(&self, config_file: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_file, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Directory the local story store lives in.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("store")),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            error_policy: if self.strict_storage {
                ErrorPolicy::Strict
            } else {
                ErrorPolicy::Lenient
            },
        }
    }

    pub fn controller_config(&self, start_online: bool) -> ControllerConfig {
        ControllerConfig {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            start_online,
        }
    }

    /// Set a config value (in memory; call `save` to persist)
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_base_url" => {
                anyhow::ensure!(
                    value.starts_with("http://") || value.starts_with("https://"),
                    "API base URL must start with http:// or https://"
                );
                self.api_base_url = value.trim_end_matches('/').to_string();
            }
            "storage_path" => {
                self.storage_path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "strict_storage" => {
                self.strict_storage = value.parse().context("Invalid boolean value")?;
            }
            "settle_delay_ms" => {
                self.settle_delay_ms = value.parse().context("Invalid number")?;
            }
            "request_timeout_secs" => {
                self.request_timeout_secs = value.parse().context("Invalid number")?;
                anyhow::ensure!(self.request_timeout_secs > 0, "Timeout must be positive");
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Set a config value and save
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "api_base_url" => Some(self.api_base_url.clone()),
            "storage_path" => self.storage_path.clone(),
            "strict_storage" => Some(self.strict_storage.to_string()),
            "settle_delay_ms" => Some(self.settle_delay_ms.to_string()),
            "request_timeout_secs" => Some(self.request_timeout_secs.to_string()),
            _ => None,
        }
    }

    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("api_base_url".to_string(), self.api_base_url.clone()),
            (
                "storage_path".to_string(),
                self.storage_path
                    .clone()
                    .unwrap_or_else(|| "(auto)".to_string()),
            ),
            ("strict_storage".to_string(), self.strict_storage.to_string()),
            ("settle_delay_ms".to_string(), format!("{}ms", self.settle_delay_ms)),
            (
                "request_timeout_secs".to_string(),
                format!("{}s", self.request_timeout_secs),
            ),
        ]
    }
}
