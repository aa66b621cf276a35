//! Wire formats.
//!
//! | Format | Shape |
//! |--------|-------|
//! | V1 | base64url of `hhhh<name> <payload>\n` text packets |
//! | V2 | base64url of a binary tag/varint-length/value stream |
//! | V2 JSON | a JSON object with the V2 field names |

pub mod base64;
mod json;
mod v1;
mod v2;

use patisserie_core::{Limits, SerializationFormat};

use crate::error::MacaroonError;
use crate::macaroon::Macaroon;

pub(crate) fn serialize(
    macaroon: &Macaroon,
    format: SerializationFormat,
    limits: &Limits,
) -> Result<String, MacaroonError> {
    match format {
        SerializationFormat::V1 => v1::encode(macaroon, limits),
        SerializationFormat::V2 => v2::encode(macaroon, limits),
        SerializationFormat::V2Json => json::encode(macaroon),
    }
}

pub(crate) fn deserialize(
    input: &str,
    format: SerializationFormat,
    limits: &Limits,
) -> Result<Macaroon, MacaroonError> {
    let decoded = match format {
        SerializationFormat::V1 => v1::decode(input, limits),
        SerializationFormat::V2 => v2::decode(input, limits),
        SerializationFormat::V2Json => json::decode(input, limits),
    };
    if let Err(e) = &decoded {
        tracing::debug!(%format, error = %e, "failed to deserialize macaroon");
    }
    decoded
}
