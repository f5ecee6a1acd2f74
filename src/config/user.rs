//! User configuration loading for nagare.
//!
//! User config location: $XDG_CONFIG_HOME/nagare/nagare.toml
//! Fallback: the platform config directory (~/.config/nagare/nagare.toml on Linux)

use std::path::PathBuf;

use super::NagareSettings;
use crate::error::ConfigError;

/// Returns the path to the user configuration file.
///
/// The path is determined by:
/// 1. If $XDG_CONFIG_HOME is set: $XDG_CONFIG_HOME/nagare/nagare.toml
/// 2. Otherwise: `dirs::config_dir()`/nagare/nagare.toml
///
/// Returns None if no config directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("nagare").join("nagare.toml"));
    }

    dirs::config_dir().map(|dir| dir.join("nagare").join("nagare.toml"))
}

/// Load the user-wide settings, or defaults when no file exists.
pub fn load_user_settings() -> Result<NagareSettings, ConfigError> {
    match user_config_path() {
        Some(path) if path.exists() => super::load_settings(&path),
        _ => Ok(NagareSettings::default()),
    }
}
