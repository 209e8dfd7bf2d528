//! Channel configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for one [`EventChannel`](crate::EventChannel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Name used in logs and failure reports.
    pub name: String,
    /// Max events held while the channel is paused. When full, the oldest
    /// buffered event is dropped.
    pub pause_buffer_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "events".to_string(),
            pause_buffer_capacity: 1024,
        }
    }
}

impl ChannelConfig {
    /// Default configuration with the given channel name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the pause buffer capacity.
    #[must_use]
    pub fn with_pause_buffer_capacity(mut self, capacity: usize) -> Self {
        self.pause_buffer_capacity = capacity;
        self
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the invariants the channel relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.pause_buffer_capacity < 1 {
            return Err(ConfigError::TooSmall {
                field: "pause_buffer_capacity".to_string(),
                min: 1,
                actual: self.pause_buffer_capacity,
            });
        }
        Ok(())
    }
}
