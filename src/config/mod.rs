//! Configuration file support for snapflow.
//!
//! Settings are read from `~/.config/snapflow/config.toml`. They cover where
//! captures are saved, the clipboard command, and the relative progress
//! weights of the built-in stages.
//!
//! If no config file exists, sensible defaults are used automatically.

pub mod types;

pub use types::{ClipboardConfig, SaveConfig, WeightsConfig};

use anyhow::{Context, Result};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::stages::FileSaveConfig;
use crate::stages::file::expand_tilde;

const MAX_WEIGHT: f64 = 1000.0;

/// Main configuration structure containing all user settings.
///
/// # Example TOML
/// ```toml
/// [save]
/// directory = "~/Pictures/Snapflow"
/// filename_template = "capture_%Y-%m-%d_%H%M%S"
///
/// [clipboard]
/// enabled = true
/// command = "wl-copy"
///
/// [weights]
/// read = 10.0
/// save = 10.0
/// clipboard = 1.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// File saving settings
    #[serde(default)]
    pub save: SaveConfig,

    /// Clipboard settings
    #[serde(default)]
    pub clipboard: ClipboardConfig,

    /// Progress weights of the built-in stages
    #[serde(default)]
    pub weights: WeightsConfig,
}

fn clamp_weight(name: &str, value: &mut f64) {
    if !value.is_finite() || !(0.0..=MAX_WEIGHT).contains(value) {
        let clamped = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, MAX_WEIGHT)
        };
        log::warn!(
            "Invalid weights.{} = {}, clamping to {:.1}",
            name,
            value,
            clamped
        );
        *value = clamped;
    }
}

impl Config {
    /// Validates and clamps configuration values to acceptable ranges.
    ///
    /// Weights are clamped to 0.0 - 1000.0 (NaN becomes 0.0). Empty
    /// extensions, templates or commands fall back to their defaults.
    fn validate_and_clamp(&mut self) {
        clamp_weight("read", &mut self.weights.read);
        clamp_weight("save", &mut self.weights.save);
        clamp_weight("clipboard", &mut self.weights.clipboard);

        let defaults = SaveConfig::default();
        for (name, value, fallback) in [
            ("save.format", &mut self.save.format, defaults.format),
            ("save.text_format", &mut self.save.text_format, defaults.text_format),
            (
                "save.filename_template",
                &mut self.save.filename_template,
                defaults.filename_template,
            ),
            (
                "clipboard.command",
                &mut self.clipboard.command,
                ClipboardConfig::default().command,
            ),
        ] {
            if value.trim().is_empty() {
                log::warn!("Empty {}, using default '{}'", name, fallback);
                *value = fallback;
            }
        }
    }

    /// Returns the path to the configuration file.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined (e.g., HOME not set).
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("snapflow");

        Ok(config_dir.join("config.toml"))
    }

    /// Loads configuration from the default location, or returns defaults if not found.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Loads configuration from `config_path`, or returns defaults if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or contains
    /// invalid TOML.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found, using defaults");
            debug!("Expected config at: {}", config_path.display());
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

        config.validate_and_clamp();

        info!("Loaded config from {}", config_path.display());
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Saves the configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    /// Serializes the configuration to TOML at `config_path`, creating the
    /// parent directory if needed.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let config_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, config_str)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        info!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// JSON schema describing the configuration file.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Config)
    }

    /// File saving settings with the directory tilde-expanded.
    pub fn file_save_config(&self) -> FileSaveConfig {
        FileSaveConfig {
            save_directory: expand_tilde(&self.save.directory),
            filename_template: self.save.filename_template.clone(),
            format: self.save.format.clone(),
            text_format: self.save.text_format.clone(),
        }
    }
}
