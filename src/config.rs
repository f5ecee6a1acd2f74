pub mod settings;
pub mod user;

use std::path::Path;

pub use settings::{ClientSettings, NagareSettings, ServerSettings, TransportSettings};
pub use user::{load_user_settings, user_config_path};

use crate::error::ConfigError;

/// Load settings from a TOML file.
///
/// Missing sections and fields take their defaults; zero buffer sizes are
/// rejected because a bridge with no capacity can never make progress.
pub fn load_settings(path: &Path) -> Result<NagareSettings, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let settings = NagareSettings::from_toml_str(&content)?;
    log::debug!(
        target: "nagare::config",
        "Loaded settings from {}",
        path.display()
    );
    Ok(settings)
}
