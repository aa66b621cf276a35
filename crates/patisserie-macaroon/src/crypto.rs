//! Cryptographic primitives used by the macaroon protocol.
//!
//! The protocol needs exactly four things: HMAC-SHA256, the NaCl
//! `secretbox` construction (XSalsa20-Poly1305), a source of nonces and a
//! constant-time comparison. They are bundled behind [`CryptoProvider`] so
//! builders and verifiers receive them explicitly instead of looking them up
//! in a global registry.

use crate::error::MacaroonError;
use rand::RngCore;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Size of an HMAC-SHA256 output, and therefore of every signature.
pub const HASH_BYTES: usize = 32;

/// Size of an XSalsa20 nonce.
pub const NONCE_BYTES: usize = 24;

/// Size of the Poly1305 tag that `secretbox` places before the ciphertext.
pub const SECRETBOX_TAG_BYTES: usize = 16;

/// A 32-byte HMAC-SHA256 output.
pub type Digest = [u8; HASH_BYTES];

/// Capability bundle for the primitives the protocol depends on.
pub trait CryptoProvider: Send + Sync {
    /// HMAC-SHA256 of `message` under `key`.
    fn hmac_sha256(&self, key: &[u8], message: &[u8]) -> Result<Digest, MacaroonError>;

    /// Seal `plaintext`, returning `tag || ciphertext`.
    fn secretbox_seal(
        &self,
        key: &Digest,
        nonce: &[u8; NONCE_BYTES],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, MacaroonError>;

    /// Open `tag || ciphertext`. `None` when authentication fails.
    fn secretbox_open(
        &self,
        key: &Digest,
        nonce: &[u8; NONCE_BYTES],
        sealed: &[u8],
    ) -> Option<Vec<u8>>;

    /// Fill `nonce` with bytes that never repeat under the same key.
    fn fill_nonce(&self, nonce: &mut [u8; NONCE_BYTES]);
}

/// RustCrypto-backed provider with a thread-local CSPRNG for nonces.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCrypto;

impl CryptoProvider for DefaultCrypto {
    fn hmac_sha256(&self, key: &[u8], message: &[u8]) -> Result<Digest, MacaroonError> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| MacaroonError::CryptoUnavailable(format!("HMAC-SHA256: {e}")))?;
        mac.update(message);

        let mut digest = [0u8; HASH_BYTES];
        digest.copy_from_slice(&mac.finalize().into_bytes());
        Ok(digest)
    }

    fn secretbox_seal(
        &self,
        key: &Digest,
        nonce: &[u8; NONCE_BYTES],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, MacaroonError> {
        use crypto_secretbox::aead::{Aead, KeyInit};
        use crypto_secretbox::{Nonce, XSalsa20Poly1305};

        let cipher = XSalsa20Poly1305::new(key.into());
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| MacaroonError::CryptoUnavailable("XSalsa20-Poly1305 seal".to_string()))
    }

    fn secretbox_open(
        &self,
        key: &Digest,
        nonce: &[u8; NONCE_BYTES],
        sealed: &[u8],
    ) -> Option<Vec<u8>> {
        use crypto_secretbox::aead::{Aead, KeyInit};
        use crypto_secretbox::{Nonce, XSalsa20Poly1305};

        let cipher = XSalsa20Poly1305::new(key.into());
        cipher.decrypt(Nonce::from_slice(nonce), sealed).ok()
    }

    fn fill_nonce(&self, nonce: &mut [u8; NONCE_BYTES]) {
        let mut rng = rand::rng();
        rng.fill_bytes(nonce);
    }
}

/// The provider used when none is given.
pub fn default_provider() -> Arc<dyn CryptoProvider> {
    Arc::new(DefaultCrypto)
}

/// Compare two byte strings without leaking where they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_rfc4231_case_2() {
        let digest = DefaultCrypto
            .hmac_sha256(b"Jefe", b"what do ya want for nothing?")
            .unwrap();
        assert_eq!(
            hex::encode(digest),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_secretbox_roundtrip() {
        let key = [7u8; HASH_BYTES];
        let mut nonce = [0u8; NONCE_BYTES];
        DefaultCrypto.fill_nonce(&mut nonce);

        let sealed = DefaultCrypto.secretbox_seal(&key, &nonce, b"discharge key").unwrap();
        assert_eq!(sealed.len(), SECRETBOX_TAG_BYTES + b"discharge key".len());

        let opened = DefaultCrypto.secretbox_open(&key, &nonce, &sealed).unwrap();
        assert_eq!(opened, b"discharge key");
    }

    #[test]
    fn test_secretbox_rejects_wrong_key() {
        let nonce = [1u8; NONCE_BYTES];
        let sealed = DefaultCrypto
            .secretbox_seal(&[7u8; HASH_BYTES], &nonce, b"discharge key")
            .unwrap();
        assert!(DefaultCrypto
            .secretbox_open(&[8u8; HASH_BYTES], &nonce, &sealed)
            .is_none());
    }

    #[test]
    fn test_secretbox_rejects_truncated_input() {
        let nonce = [1u8; NONCE_BYTES];
        assert!(DefaultCrypto
            .secretbox_open(&[7u8; HASH_BYTES], &nonce, &[0u8; 4])
            .is_none());
    }

    #[test]
    fn test_nonces_differ() {
        let mut a = [0u8; NONCE_BYTES];
        let mut b = [0u8; NONCE_BYTES];
        DefaultCrypto.fill_nonce(&mut a);
        DefaultCrypto.fill_nonce(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
