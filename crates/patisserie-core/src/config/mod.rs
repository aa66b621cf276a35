//! Configuration types for Patisserie macaroons.
//!
//! Configuration is a single YAML document. Every section is optional and
//! falls back to the limits of the reference macaroon format:
//!
//! ```yaml
//! limits:
//!   max_field_length: 32768
//!   max_packet_length: 65535
//!   max_caveats: 65536
//!   max_discharge_depth: 32
//! verifier:
//!   diagnostics: false
//! serialization:
//!   default_format: v2
//! ```

pub mod limits;
pub mod serialization;
pub mod verifier;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use limits::Limits;
pub use serialization::{SerializationFormat, SerializationSettings};
pub use verifier::VerifierSettings;

/// Complete macaroon configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacaroonConfig {
    /// Hard caps applied while building, encoding and decoding.
    #[serde(default)]
    pub limits: Limits,

    /// Verifier behaviour.
    #[serde(default)]
    pub verifier: VerifierSettings,

    /// Wire format defaults.
    #[serde(default)]
    pub serialization: SerializationSettings,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MacaroonConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content and validate it.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configured values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()
    }
}
