//! Wire format selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The wire formats a macaroon can be encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Legacy text/packet format, base64url wrapped.
    #[default]
    V1,
    /// Compact binary TLV format, base64url wrapped.
    V2,
    /// JSON object with the V2 field names.
    V2Json,
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationFormat::V1 => write!(f, "v1"),
            SerializationFormat::V2 => write!(f, "v2"),
            SerializationFormat::V2Json => write!(f, "v2json"),
        }
    }
}

/// Serialization defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationSettings {
    /// Format used when the caller does not pick one.
    #[serde(default)]
    pub default_format: SerializationFormat,
}
