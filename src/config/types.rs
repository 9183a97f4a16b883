//! Configuration type definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where and how captures are written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SaveConfig {
    /// Target directory; a leading `~/` is expanded to the home directory
    #[serde(default = "default_save_directory")]
    pub directory: String,

    /// File name template with chrono format specifiers (e.g. `%Y-%m-%d`)
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Extension used for image captures
    #[serde(default = "default_format")]
    pub format: String,

    /// Extension used for text captures
    #[serde(default = "default_text_format")]
    pub text_format: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            directory: default_save_directory(),
            filename_template: default_filename_template(),
            format: default_format(),
            text_format: default_text_format(),
        }
    }
}

/// Clipboard integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipboardConfig {
    /// Copy the result of each pipeline to the clipboard
    #[serde(default = "default_clipboard_enabled")]
    pub enabled: bool,

    /// Command that receives clipboard contents on stdin (called with `--type <mime>`)
    #[serde(default = "default_clipboard_command")]
    pub command: String,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_clipboard_enabled(),
            command: default_clipboard_command(),
        }
    }
}

/// Relative progress weights of the built-in stages (valid range: 0.0 - 1000.0).
///
/// Only the ratios matter: a stage with twice the weight of its sibling
/// covers twice as much of the progress bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeightsConfig {
    #[serde(default = "default_read_weight")]
    pub read: f64,

    #[serde(default = "default_save_weight")]
    pub save: f64,

    #[serde(default = "default_clipboard_weight")]
    pub clipboard: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            read: default_read_weight(),
            save: default_save_weight(),
            clipboard: default_clipboard_weight(),
        }
    }
}

fn default_save_directory() -> String {
    "~/Pictures/Snapflow".to_string()
}

fn default_filename_template() -> String {
    "capture_%Y-%m-%d_%H%M%S".to_string()
}

fn default_format() -> String {
    "png".to_string()
}

fn default_text_format() -> String {
    "txt".to_string()
}

fn default_clipboard_enabled() -> bool {
    true
}

fn default_clipboard_command() -> String {
    "wl-copy".to_string()
}

fn default_read_weight() -> f64 {
    10.0
}

fn default_save_weight() -> f64 {
    10.0
}

fn default_clipboard_weight() -> f64 {
    1.0
}
