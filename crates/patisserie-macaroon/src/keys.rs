//! Root key derivation and signature chaining.
//!
//! A macaroon signature is a running HMAC: the derived root key signs the
//! identifier, and each caveat is signed with the signature that preceded
//! it. Third-party caveats and discharge binding fold two messages into one
//! step with [`chain_pair`].

use crate::crypto::{CryptoProvider, Digest, HASH_BYTES};
use crate::error::MacaroonError;
use std::fmt;

/// Fixed HMAC key used to normalize user secrets into root keys.
const KEY_GENERATOR: &[u8] = b"macaroons-key-generator";

/// A 32-byte key derived from an arbitrary-length secret.
///
/// Root keys are only ever held transiently while minting, attenuating or
/// verifying; they are never part of a macaroon.
#[derive(Clone)]
pub struct RootKey([u8; HASH_BYTES]);

impl RootKey {
    /// Derive a root key from a secret of any length, including zero.
    pub fn derive(crypto: &dyn CryptoProvider, secret: &[u8]) -> Result<Self, MacaroonError> {
        crypto.hmac_sha256(KEY_GENERATOR, secret).map(Self)
    }

    /// Wrap bytes that are already a derived root key.
    pub fn from_bytes(bytes: [u8; HASH_BYTES]) -> Self {
        Self(bytes)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_BYTES] {
        &self.0
    }
}

impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootKey(..)")
    }
}

/// `HMAC(key, message)`: one step of the signature chain.
pub fn chain(
    crypto: &dyn CryptoProvider,
    key: &[u8],
    message: &[u8],
) -> Result<Digest, MacaroonError> {
    crypto.hmac_sha256(key, message)
}

/// `HMAC(key, HMAC(key, first) || HMAC(key, second))`.
pub fn chain_pair(
    crypto: &dyn CryptoProvider,
    key: &[u8],
    first: &[u8],
    second: &[u8],
) -> Result<Digest, MacaroonError> {
    let mut joined = [0u8; 2 * HASH_BYTES];
    joined[..HASH_BYTES].copy_from_slice(&crypto.hmac_sha256(key, first)?);
    joined[HASH_BYTES..].copy_from_slice(&crypto.hmac_sha256(key, second)?);
    crypto.hmac_sha256(key, &joined)
}

/// Signature a discharge macaroon must carry when presented with the root
/// macaroon whose signature is `root_signature`.
pub fn bind_signature(
    crypto: &dyn CryptoProvider,
    root_signature: &Digest,
    discharge_signature: &Digest,
) -> Result<Digest, MacaroonError> {
    chain_pair(
        crypto,
        &[0u8; HASH_BYTES],
        root_signature,
        discharge_signature,
    )
}
