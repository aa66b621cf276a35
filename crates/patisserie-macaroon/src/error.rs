//! Error types for the macaroon crate.

use patisserie_core::ConfigError;
use thiserror::Error;

/// Errors that can occur while building, encoding or decoding macaroons.
///
/// A macaroon that fails verification is not an error: verification answers
/// with a boolean, and only [`MacaroonError::Invalid`] is produced when the
/// caller asks for an assertion instead.
#[derive(Debug, Error)]
pub enum MacaroonError {
    /// Serialized input is malformed.
    #[error("macaroon is not deserializable: {0}")]
    NotDeserializable(String),

    /// A cryptographic primitive could not be used.
    #[error("cryptographic primitive unavailable: {0}")]
    CryptoUnavailable(String),

    /// A field is longer than the configured limit.
    #[error("{field} is {len} bytes long, the limit is {max} bytes")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Adding another caveat would exceed the configured limit.
    #[error("too many caveats, at most {max} are allowed")]
    TooManyCaveats { max: usize },

    /// The macaroon did not verify.
    #[error("macaroon is not valid")]
    Invalid,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl MacaroonError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        MacaroonError::NotDeserializable(reason.into())
    }
}
