use std::time::Duration;

use crate::config::ClientSettings;
use crate::config::settings::DEFAULT_BUFFER_SIZE;
use crate::metadata::Metadata;

/// Per-call options for client helpers.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Deadline relative to call start, enforced by the transport.
    pub timeout: Option<Duration>,
    /// Capacity of the credit-bounded response buffer. At least 1.
    pub response_buffer_size: usize,
    /// Request headers.
    pub headers: Metadata,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            response_buffer_size: DEFAULT_BUFFER_SIZE,
            headers: Metadata::new(),
        }
    }
}

impl CallOptions {
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::default().with_response_buffer_size(settings.response_buffer_size)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sizes below 1 are raised to 1.
    pub fn with_response_buffer_size(mut self, size: usize) -> Self {
        self.response_buffer_size = size.max(1);
        self
    }

    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }
}
