//! Runtime configuration.
//!
//! Loaded from TOML, every field optional:
//!
//! ```toml
//! frames_in_flight = 2
//! staging_buffer_bytes = 262144
//! dependency_list_capacity = 8
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest supported number of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML text could not be parsed.
    #[error("failed to parse resource config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is outside its valid range.
    #[error("invalid resource config: {0}")]
    Invalid(String),
}

/// Settings shared by every builder of a [`ResourceFactory`](crate::ResourceFactory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceConfig {
    /// Depth of the deferred disposal ring, mirroring GPU buffering depth.
    pub frames_in_flight: usize,
    /// Largest single mesh upload staged through the byte buffer pool.
    pub staging_buffer_bytes: usize,
    /// Initial capacity of each per-resource dependency list.
    pub dependency_list_capacity: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            staging_buffer_bytes: 1024 * 1024,
            dependency_list_capacity: 4,
        }
    }
}

impl ResourceConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the deferred disposal depth.
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    /// Set the staging memory per space.
    pub fn with_staging_buffer_bytes(mut self, bytes: usize) -> Self {
        self.staging_buffer_bytes = bytes;
        self
    }

    /// Check every value is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "frames_in_flight must be between 1 and {MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if self.staging_buffer_bytes == 0 {
            return Err(ConfigError::Invalid(
                "staging_buffer_bytes must be greater than zero".to_string(),
            ));
        }
        if self.dependency_list_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dependency_list_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
