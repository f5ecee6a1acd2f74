use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default capacity for every credit-bounded buffer.
///
/// One slot keeps the peer exactly one message ahead of the consumer, which
/// is the tightest bound that still lets the pipeline make progress.
pub const DEFAULT_BUFFER_SIZE: usize = 1;

/// Default number of messages the in-process transport queues past the
/// receiver's credit before reporting a sender as not ready. Zero means a
/// sender is ready only while the receiver has asked for more.
pub const DEFAULT_TRANSPORT_WINDOW: usize = 0;

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_window() -> usize {
    DEFAULT_TRANSPORT_WINDOW
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientSettings {
    #[serde(default = "default_buffer_size")]
    pub response_buffer_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            response_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_buffer_size")]
    pub request_buffer_size: usize,
    #[serde(default = "default_buffer_size")]
    pub response_buffer_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            request_buffer_size: DEFAULT_BUFFER_SIZE,
            response_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransportSettings {
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_TRANSPORT_WINDOW,
        }
    }
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NagareSettings {
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub transport: TransportSettings,
}

impl NagareSettings {
    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: NagareSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("client.response_buffer_size", self.client.response_buffer_size),
            ("server.request_buffer_size", self.server.request_buffer_size),
            ("server.response_buffer_size", self.server.response_buffer_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::invalid(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}
