// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::engine::ExportQuality;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root folder of recorded clips
    #[serde(default = "default_clip_location")]
    pub clip_location: PathBuf,

    /// Quality tier used when an export request leaves it unset.
    /// Unrecognized values fall back to "discord".
    #[serde(default = "default_quality")]
    pub preferred_quality: String,

    /// Whether exports may pass the audio stream through unmodified when no
    /// audio processing is required
    #[serde(default = "default_true_config")]
    pub allow_audio_copy: bool,
}

fn default_clip_location() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_quality() -> String {
    "discord".to_string()
}

fn default_true_config() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clip_location: default_clip_location(),
            preferred_quality: default_quality(),
            allow_audio_copy: true,
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
                .join("clipforge")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("clipforge")
        };
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, falling back to defaults when no file exists.
    /// A present-but-malformed file is an error, not a silent default.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save config to disk, creating the config directory if needed
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn preferred_quality(&self) -> ExportQuality {
        ExportQuality::parse(&self.preferred_quality)
    }
}
