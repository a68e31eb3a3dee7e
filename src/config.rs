// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Try the remux+concat fast path before re-encoding
    #[serde(default = "default_true_config")]
    pub prefer_remux: bool,

    /// Allow hardware encoders for the fallback re-encode
    #[serde(default = "default_true_config")]
    pub use_hardware: bool,

    /// Number of concurrent jobs
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// Seconds each bookend image is shown in batch mode
    #[serde(default = "default_image_duration")]
    pub image_duration: f64,
}

fn default_true_config() -> bool {
    true
}

fn default_max_workers() -> u32 {
    1
}

fn default_image_duration() -> f64 {
    3.0
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            prefer_remux: true,
            use_hardware: true,
            max_workers: default_max_workers(),
            image_duration: default_image_duration(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("bookend")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("bookend")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or fall back to defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            let config: Config = toml::from_str(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<()> {
        if !Self::exists() {
            let config = Config::default();
            config.save()?;
        }
        Ok(())
    }
}
