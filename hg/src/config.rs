//! Hallucigenia configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::watcher::WatchConfig;

/// Main Hallucigenia configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root data directory (repositories and the application log live here)
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Watch loop settings
    pub watch: WatchConfig,

    /// Remote API settings
    pub remote: RemoteConfig,

    /// Git settings
    pub git: GitConfig,

    /// Side-effect script settings
    pub scripts: ScriptsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: None,
            watch: WatchConfig::default(),
            remote: RemoteConfig::default(),
            git: GitConfig::default(),
            scripts: ScriptsConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hallucigenia")
}

impl Config {
    /// Directory holding one folder per repository
    pub fn repositories_dir(&self) -> PathBuf {
        self.data_dir.join("repositories")
    }

    /// Directory for the application log
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .hallucigenia.yml
        let local_config = PathBuf::from(".hallucigenia.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/hallucigenia/hallucigenia.yml
        if let Some(user_config) = user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hallucigenia").join("hallucigenia.yml"))
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// REST API base URL
    #[serde(rename = "api-base-url")]
    pub api_base_url: String,

    /// Host used to build authenticated clone URLs
    #[serde(rename = "clone-base-url")]
    pub clone_base_url: String,

    /// Branches requested per page
    #[serde(rename = "page-len")]
    pub page_len: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Empty the stored branch list when an explicit sync fails
    #[serde(rename = "clear-branches-on-sync-failure")]
    pub clear_branches_on_sync_failure: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.bitbucket.org/2.0".to_string(),
            clone_base_url: "https://bitbucket.org".to_string(),
            page_len: 100,
            timeout_ms: 30_000,
            clear_branches_on_sync_failure: false,
        }
    }
}

/// Git configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// git executable
    pub program: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

/// Side-effect script configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Environment variable carrying the updated branch's working tree path
    #[serde(rename = "branch-path-env")]
    pub branch_path_env: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            branch_path_env: "UPDATED_BRANCH_PATH".to_string(),
        }
    }
}
