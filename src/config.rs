//! Configuration management for the polling engine.
//!
//! Settings are loaded from YAML, JSON or TOML files; every field has a
//! default so an empty file yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::logging::parse_log_level;

// Default configuration constants
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 5;
pub const DEFAULT_ROOT: &str = "/";

/// Serialization format for [`render_settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between polling cycles (default: 60, minimum: 1)
    #[serde(default = "default_poll_interval_seconds", alias = "poll")]
    pub poll_interval_seconds: u64,

    /// Host identity stamped into every metric tuple
    #[serde(default)]
    pub computer: Option<String>,

    /// Directory that /proc, /sys, /etc and the utilities are resolved
    /// against (default: /)
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Seconds `stop` waits for the polling thread (default: 5)
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,

    #[serde(default = "default_log_level", alias = "log-level")]
    pub log_level: String,
}

fn default_poll_interval_seconds() -> u64 {
    DEFAULT_POLL_INTERVAL_SECONDS
}
fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}
fn default_shutdown_grace_seconds() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECONDS
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            computer: None,
            root: default_root(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            log_level: default_log_level(),
        }
    }
}

/// Validate effective settings (used before an engine is started)
pub fn validate_settings(settings: &Settings) -> Result<(), String> {
    if settings.poll_interval_seconds < 1 {
        return Err(format!(
            "poll_interval_seconds must be >= 1, got {}",
            settings.poll_interval_seconds
        ));
    }

    parse_log_level(&settings.log_level)?;

    if settings.root.as_os_str().is_empty() {
        return Err("root must not be empty".into());
    }

    Ok(())
}

/// Loads settings from `path`, picking the format from the extension.
/// Unknown extensions are parsed as YAML.
pub fn load_settings(path: &Path) -> Result<Settings, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;

    let settings: Settings = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        _ => {
            // Default to YAML; an empty document means all defaults
            if content.trim().is_empty() {
                Settings::default()
            } else {
                serde_yaml::from_str(&content)?
            }
        }
    };

    info!("Loaded configuration from: {}", path.display());
    Ok(settings)
}

/// Renders settings in the requested format.
pub fn render_settings(
    settings: &Settings,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(settings)?,
        ConfigFormat::Toml => toml::to_string_pretty(settings)?,
        ConfigFormat::Yaml => serde_yaml::to_string(settings)?,
    };
    Ok(output)
}
