//! Size limits shared by the builder, the verifier and the wire codecs.

use super::ConfigError;
use serde::{Deserialize, Serialize};

/// Identifiers, locations and predicates must be shorter than this many bytes.
pub const MAX_FIELD_LENGTH: usize = 32768;

/// Largest V1 packet or V2 field accepted on the wire.
pub const MAX_PACKET_LENGTH: usize = 65535;

/// Largest number of caveats a single macaroon may carry.
pub const MAX_CAVEATS: usize = 65536;

/// Deepest chain of discharge macaroons a verifier will follow.
pub const MAX_DISCHARGE_DEPTH: usize = 32;

/// Hard caps that bound the cost of building and verifying macaroons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Exclusive upper bound for identifier, location and predicate lengths
    /// when building.
    #[serde(default = "default_max_field_length")]
    pub max_field_length: usize,

    /// Inclusive upper bound for a single encoded packet or field.
    #[serde(default = "default_max_packet_length")]
    pub max_packet_length: usize,

    /// Inclusive upper bound for the number of caveats.
    #[serde(default = "default_max_caveats")]
    pub max_caveats: usize,

    /// Inclusive upper bound for nested discharge verification.
    #[serde(default = "default_max_discharge_depth")]
    pub max_discharge_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_field_length: MAX_FIELD_LENGTH,
            max_packet_length: MAX_PACKET_LENGTH,
            max_caveats: MAX_CAVEATS,
            max_discharge_depth: MAX_DISCHARGE_DEPTH,
        }
    }
}

impl Limits {
    /// Reject limits that would make every macaroon unrepresentable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_field_length == 0 {
            return Err(ConfigError::Config(
                "limits.max_field_length must be greater than zero".to_string(),
            ));
        }
        if self.max_caveats == 0 {
            return Err(ConfigError::Config(
                "limits.max_caveats must be greater than zero".to_string(),
            ));
        }
        // A V2 length prefix can never describe more than 16 bits worth of data.
        if self.max_packet_length == 0 || self.max_packet_length > MAX_PACKET_LENGTH {
            return Err(ConfigError::Config(format!(
                "limits.max_packet_length must be between 1 and {MAX_PACKET_LENGTH}"
            )));
        }
        if self.max_field_length > self.max_packet_length {
            return Err(ConfigError::Config(
                "limits.max_field_length cannot exceed limits.max_packet_length".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a field of `len` bytes may be added by a builder.
    pub fn field_fits(&self, len: usize) -> bool {
        len < self.max_field_length
    }
}

fn default_max_field_length() -> usize {
    MAX_FIELD_LENGTH
}

fn default_max_packet_length() -> usize {
    MAX_PACKET_LENGTH
}

fn default_max_caveats() -> usize {
    MAX_CAVEATS
}

fn default_max_discharge_depth() -> usize {
    MAX_DISCHARGE_DEPTH
}
