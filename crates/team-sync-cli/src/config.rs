//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use team_sync::{SyncConfig, UserIdentity};

/// Main configuration for the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local store file (relative paths resolve against the config directory)
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Root of the shared document directory
    #[serde(default = "default_remote_root")]
    pub remote_root: PathBuf,

    /// Signed-in user; without one the engine stays local-only
    #[serde(default)]
    pub user: Option<UserConfig>,

    /// Engine settings
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserConfig {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            uid: self.uid.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            photo_url: None,
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("store.json")
}

fn default_remote_root() -> PathBuf {
    PathBuf::from("remote")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            remote_root: default_remote_root(),
            user: None,
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config directory
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_file = config_dir.join("config.json");

        let mut config = if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| "Failed to parse config.json")?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            config
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_file);
            let config = Config::default();

            // Create config directory if it doesn't exist
            std::fs::create_dir_all(config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            config
        };

        config.store_path = config_dir.join(&config.store_path);
        config.remote_root = config_dir.join(&config.remote_root);
        Ok(config)
    }
}
