use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::API_ENDPOINT;

const APP_NAME: &str = "opensubtitles";
const CONFIG_FILE: &str = "config.json";

const ENV_API_KEY: &str = "OPENSUBTITLES_API_KEY";
const ENV_BASE_URL: &str = "OPENSUBTITLES_BASE_URL";
const ENV_TIMEOUT_SEC: &str = "OPENSUBTITLES_TIMEOUT_SEC";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_key: String,
    /// Endpoint without the version segment
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    API_ENDPOINT.to_string()
}

fn default_timeout_sec() -> u64 {
    5
}

fn default_user_agent() -> String {
    format!("opensubtitles-rs/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            timeout_sec: default_timeout_sec(),
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    /// Applies overrides from a variable lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup(ENV_API_KEY) {
            self.api_key = api_key;
        }
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_SEC) {
            self.timeout_sec = timeout
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TIMEOUT_SEC} is not a number: {timeout}"))?;
        }
        Ok(())
    }
}

/// Configuration loader
pub struct ConfigManager {
    config: ClientConfig,
}

impl ConfigManager {
    /// Loads the config file from the user's config directory, then applies
    /// environment overrides
    pub fn new() -> Result<Self> {
        let config_file = Self::config_dir()?.join(CONFIG_FILE);

        let mut config = if config_file.exists() {
            Self::read(&config_file)?
        } else {
            ClientConfig::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;

        Ok(Self { config })
    }

    /// Loads an explicit config file without environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(Self {
            config: Self::read(path)?,
        })
    }

    /// Gets a copy of the current configuration
    pub fn get(&self) -> ClientConfig {
        self.config.clone()
    }

    /// Returns the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join(APP_NAME))
    }

    fn read(path: &Path) -> Result<ClientConfig> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}
