// Global configuration management

use crate::engine::{
    Board, Codec, CurveCoefficients, Deadline, MAX_BITRATE_KBPS, MixdownThresholds, ResizeMode,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Resolution curve coefficients
    #[serde(default)]
    pub curves: CurveCoefficients,

    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Size profile used when `--board` is not given
    #[serde(default)]
    pub board: Board,

    #[serde(default)]
    pub codec: Codec,

    #[serde(default)]
    pub resize_mode: ResizeMode,

    /// Loudness-normalize audio (ignored in music mode)
    #[serde(default)]
    pub normalize: bool,

    #[serde(default)]
    pub deadline: Deadline,

    /// VP9 row multithreading
    #[serde(default = "default_true_config")]
    pub row_mt: bool,

    /// Keep the per-run working directory and its debug transcript
    #[serde(default)]
    pub keep_temp_files: bool,

    /// Use the raw curve value instead of snapping to the resolution table
    #[serde(default)]
    pub bypass_resolution_table: bool,

    /// Extra ffmpeg arguments appended to every final encode
    #[serde(default)]
    pub extra_args: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Video bitrate ceiling
    #[serde(default = "default_max_bitrate")]
    pub max_bitrate_kbps: u32,

    /// Bitrates at or below which `auto` mixes down
    #[serde(default)]
    pub mixdown: MixdownThresholds,
}

fn default_true_config() -> bool {
    true
}

fn default_max_bitrate() -> u32 {
    MAX_BITRATE_KBPS
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            board: Board::default(),
            codec: Codec::default(),
            resize_mode: ResizeMode::default(),
            normalize: false,
            deadline: Deadline::default(),
            row_mt: default_true_config(),
            keep_temp_files: false,
            bypass_resolution_table: false,
            extra_args: String::new(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_bitrate_kbps: default_max_bitrate(),
            mixdown: MixdownThresholds::default(),
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
                .join("clipfit")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("clipfit")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            Self::from_toml(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })
        } else {
            let config = Config::default();

            // Not fatal: an unwritable config dir just means built-in defaults
            if let Err(e) = config.save() {
                warn!(
                    error = %e,
                    "could not create default config file, using built-in defaults; run 'clipfit init-config' to create one"
                );
            }

            Ok(config)
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid config TOML")
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
            Config::default().save()?;
        }
        Ok(())
    }
}
