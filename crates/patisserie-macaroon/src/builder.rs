//! Minting and attenuation.

use patisserie_core::Limits;
use std::sync::Arc;

use crate::crypto::{self, CryptoProvider, NONCE_BYTES};
use crate::error::MacaroonError;
use crate::keys::{self, RootKey};
use crate::macaroon::Macaroon;
use crate::packet::CaveatPacket;

/// Accumulates caveats onto one macaroon.
///
/// Each step consumes the builder and returns it with a longer caveat list
/// and a re-chained signature. A builder belongs to a single construction;
/// [`Macaroon`] values it produces are immutable and freely shareable.
pub struct MacaroonBuilder {
    macaroon: Macaroon,
    crypto: Arc<dyn CryptoProvider>,
    limits: Limits,
}

impl MacaroonBuilder {
    /// Mint a root macaroon with the default crypto provider and limits.
    pub fn create(
        location: &str,
        secret: impl AsRef<[u8]>,
        identifier: impl AsRef<[u8]>,
    ) -> Result<Self, MacaroonError> {
        Self::create_with(
            location,
            secret,
            identifier,
            crypto::default_provider(),
            Limits::default(),
        )
    }

    /// Mint a root macaroon.
    ///
    /// The signature depends only on `secret` and `identifier`; `location`
    /// is carried along as an unauthenticated hint. An empty location is
    /// stored as no location.
    pub fn create_with(
        location: &str,
        secret: impl AsRef<[u8]>,
        identifier: impl AsRef<[u8]>,
        crypto: Arc<dyn CryptoProvider>,
        limits: Limits,
    ) -> Result<Self, MacaroonError> {
        limits.validate()?;
        let identifier = identifier.as_ref();
        check_field("location", location.len(), &limits)?;
        check_field("identifier", identifier.len(), &limits)?;

        let key = RootKey::derive(crypto.as_ref(), secret.as_ref())?;
        let signature = keys::chain(crypto.as_ref(), key.as_bytes(), identifier)?;

        let location = (!location.is_empty()).then(|| location.to_string());
        let macaroon = Macaroon::from_parts(location, identifier.to_vec(), Vec::new(), signature);

        Ok(Self {
            macaroon,
            crypto,
            limits,
        })
    }

    /// Continue attenuating an existing macaroon.
    pub fn modify(macaroon: Macaroon) -> Self {
        Self::modify_with(macaroon, crypto::default_provider(), Limits::default())
    }

    /// Continue attenuating an existing macaroon with explicit capabilities.
    pub fn modify_with(macaroon: Macaroon, crypto: Arc<dyn CryptoProvider>, limits: Limits) -> Self {
        Self {
            macaroon,
            crypto,
            limits,
        }
    }

    /// Append a first-party caveat: `signature = HMAC(signature, predicate)`.
    pub fn add_first_party_caveat(
        self,
        predicate: impl AsRef<[u8]>,
    ) -> Result<Self, MacaroonError> {
        let predicate = predicate.as_ref();
        check_field("predicate", predicate.len(), &self.limits)?;
        self.check_caveat_room()?;

        let signature = keys::chain(self.crypto.as_ref(), self.macaroon.signature(), predicate)?;

        let mut packets = self.macaroon.caveat_packets().to_vec();
        packets.push(CaveatPacket::Cid(predicate.to_vec()));

        tracing::debug!(caveats = self.macaroon.caveat_count() + 1, "added first-party caveat");
        Ok(self.replace(packets, signature))
    }

    /// Append a third-party caveat discharged by the holder of `caveat_key`.
    ///
    /// The derived discharge root key is sealed under the current signature
    /// with a fresh nonce, so only someone who can recompute this point of
    /// the chain can recover it.
    pub fn add_third_party_caveat(
        self,
        location: &str,
        caveat_key: impl AsRef<[u8]>,
        identifier: impl AsRef<[u8]>,
    ) -> Result<Self, MacaroonError> {
        let identifier = identifier.as_ref();
        check_field("caveat location", location.len(), &self.limits)?;
        check_field("caveat identifier", identifier.len(), &self.limits)?;
        self.check_caveat_room()?;

        let crypto = self.crypto.as_ref();
        let discharge_key = RootKey::derive(crypto, caveat_key.as_ref())?;

        let mut nonce = [0u8; NONCE_BYTES];
        crypto.fill_nonce(&mut nonce);
        let sealed = crypto.secretbox_seal(self.macaroon.signature(), &nonce, discharge_key.as_bytes())?;

        let mut vid = Vec::with_capacity(NONCE_BYTES + sealed.len());
        vid.extend_from_slice(&nonce);
        vid.extend_from_slice(&sealed);

        let signature = keys::chain_pair(crypto, self.macaroon.signature(), &vid, identifier)?;

        let mut packets = self.macaroon.caveat_packets().to_vec();
        packets.push(CaveatPacket::Cid(identifier.to_vec()));
        packets.push(CaveatPacket::Vid(vid));
        if !location.is_empty() {
            packets.push(CaveatPacket::Cl(location.as_bytes().to_vec()));
        }

        tracing::debug!(
            caveats = self.macaroon.caveat_count() + 1,
            location,
            "added third-party caveat"
        );
        Ok(self.replace(packets, signature))
    }

    /// Bind a discharge macaroon to the macaroon being built.
    ///
    /// The returned copy of `discharge` carries a signature that is only
    /// accepted alongside this exact macaroon.
    pub fn bind(&self, discharge: &Macaroon) -> Result<Macaroon, MacaroonError> {
        let signature = keys::bind_signature(
            self.crypto.as_ref(),
            self.macaroon.signature(),
            discharge.signature(),
        )?;
        Ok(Macaroon::from_parts(
            discharge.location().map(str::to_string),
            discharge.identifier().to_vec(),
            discharge.caveat_packets().to_vec(),
            signature,
        ))
    }

    /// The macaroon as built so far.
    pub fn macaroon(&self) -> &Macaroon {
        &self.macaroon
    }

    pub fn build(self) -> Macaroon {
        self.macaroon
    }

    fn check_caveat_room(&self) -> Result<(), MacaroonError> {
        if self.macaroon.caveat_count() + 1 > self.limits.max_caveats {
            return Err(MacaroonError::TooManyCaveats {
                max: self.limits.max_caveats,
            });
        }
        Ok(())
    }

    fn replace(self, packets: Vec<CaveatPacket>, signature: crypto::Digest) -> Self {
        let macaroon = Macaroon::from_parts(
            self.macaroon.location().map(str::to_string),
            self.macaroon.identifier().to_vec(),
            packets,
            signature,
        );
        Self {
            macaroon,
            crypto: self.crypto,
            limits: self.limits,
        }
    }
}

fn check_field(field: &'static str, len: usize, limits: &Limits) -> Result<(), MacaroonError> {
    if !limits.field_fits(len) {
        return Err(MacaroonError::FieldTooLong {
            field,
            len,
            max: limits.max_field_length,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{HASH_BYTES, SECRETBOX_TAG_BYTES};
    use crate::packet::PacketKind;

    const LOCATION: &str = "http://mybank/";
    const SECRET: &str = "this is our super secret key; only we should know it";
    const IDENTIFIER: &str = "we used our secret key";

    #[test]
    fn test_create_signature_vector() {
        let m = MacaroonBuilder::create(LOCATION, SECRET, IDENTIFIER)
            .unwrap()
            .build();
        assert_eq!(m.location(), Some(LOCATION));
        assert_eq!(m.identifier(), IDENTIFIER.as_bytes());
        assert_eq!(
            m.signature_hex(),
            "e3d9e02908526c4c0039ae15114115d97fdd68bf2ba379b342aaf0f617d0552f"
        );
        assert_eq!(m.caveat_count(), 0);
    }

    #[test]
    fn test_location_does_not_affect_signature() {
        let a = MacaroonBuilder::create("http://a/", SECRET, IDENTIFIER).unwrap().build();
        let b = MacaroonBuilder::create("", SECRET, IDENTIFIER).unwrap().build();
        assert_eq!(a.signature(), b.signature());
        assert_eq!(b.location(), None);
    }

    #[test]
    fn test_first_party_caveat_vector() {
        let m = MacaroonBuilder::create(LOCATION, SECRET, IDENTIFIER)
            .unwrap()
            .add_first_party_caveat("account = 3735928559")
            .unwrap()
            .build();
        assert_eq!(
            m.signature_hex(),
            "1efe4763f290dbce0c1d08477367e11f4eee456a64933cf662d79772dbb82128"
        );
        assert_eq!(
            m.caveat_packets(),
            &[CaveatPacket::Cid(b"account = 3735928559".to_vec())]
        );
    }

    #[test]
    fn test_caveat_order_changes_signature() {
        let base = MacaroonBuilder::create(LOCATION, SECRET, IDENTIFIER).unwrap().build();
        let ab = base
            .add_first_party_caveat("a = 1")
            .and_then(|m| m.add_first_party_caveat("b = 2"))
            .unwrap();
        let ba = base
            .add_first_party_caveat("b = 2")
            .and_then(|m| m.add_first_party_caveat("a = 1"))
            .unwrap();
        assert_ne!(ab.signature(), ba.signature());
    }

    #[test]
    fn test_attenuation_leaves_original_untouched() {
        let base = MacaroonBuilder::create(LOCATION, SECRET, IDENTIFIER).unwrap().build();
        let attenuated = base.add_first_party_caveat("a = 1").unwrap();
        assert_eq!(base.caveat_count(), 0);
        assert_eq!(attenuated.caveat_count(), 1);
    }

    #[test]
    fn test_other_secret_vectors() {
        let secret = "this is a different super-secret key; never use the same secret twice";
        let m = MacaroonBuilder::create(LOCATION, secret, "we used our other secret key")
            .unwrap()
            .add_first_party_caveat("account = 3735928559")
            .unwrap()
            .build();
        assert_eq!(
            m.signature_hex(),
            "1434e674ad84fdfdc9bc1aa00785325c8b6d57341fc7ce200ba4680c80786dda"
        );

        let d = MacaroonBuilder::create(
            "http://auth.mybank/",
            "4; guaranteed random by a fair toss of the dice",
            "this was how we remind auth of key/pred",
        )
        .unwrap()
        .add_first_party_caveat("time < 2015-01-01T00:00")
        .unwrap()
        .build();
        assert_eq!(
            d.signature_hex(),
            "82a80681f9f32d419af12f6a71787a1bac3ab199df934ed950ddf20c25ac8c65"
        );
    }

    #[test]
    fn test_third_party_caveat_layout() {
        let m = MacaroonBuilder::create(LOCATION, SECRET, IDENTIFIER)
            .unwrap()
            .add_third_party_caveat("http://auth.mybank/", "caveat key", "caveat id")
            .unwrap()
            .build();

        let kinds: Vec<_> = m.caveat_packets().iter().map(CaveatPacket::kind).collect();
        assert_eq!(kinds, vec![PacketKind::Cid, PacketKind::Vid, PacketKind::Cl]);

        let vid = m.caveat_packets()[1].raw_value();
        assert_eq!(vid.len(), NONCE_BYTES + SECRETBOX_TAG_BYTES + HASH_BYTES);
    }

    struct ZeroNonce;

    impl CryptoProvider for ZeroNonce {
        fn hmac_sha256(&self, key: &[u8], message: &[u8]) -> Result<crypto::Digest, MacaroonError> {
            crypto::DefaultCrypto.hmac_sha256(key, message)
        }

        fn secretbox_seal(
            &self,
            key: &crypto::Digest,
            nonce: &[u8; NONCE_BYTES],
            plaintext: &[u8],
        ) -> Result<Vec<u8>, MacaroonError> {
            crypto::DefaultCrypto.secretbox_seal(key, nonce, plaintext)
        }

        fn secretbox_open(
            &self,
            key: &crypto::Digest,
            nonce: &[u8; NONCE_BYTES],
            sealed: &[u8],
        ) -> Option<Vec<u8>> {
            crypto::DefaultCrypto.secretbox_open(key, nonce, sealed)
        }

        fn fill_nonce(&self, nonce: &mut [u8; NONCE_BYTES]) {
            nonce.fill(0);
        }
    }

    #[test]
    fn test_third_party_caveat_vector() {
        let m = MacaroonBuilder::create_with(
            LOCATION,
            "this is a different super-secret key; never use the same secret twice",
            "we used our other secret key",
            Arc::new(ZeroNonce),
            Limits::default(),
        )
        .unwrap()
        .add_first_party_caveat("account = 3735928559")
        .unwrap()
        .add_third_party_caveat(
            "http://auth.mybank/",
            "4; guaranteed random by a fair toss of the dice",
            "this was how we remind auth of key/pred",
        )
        .unwrap()
        .build();

        assert_eq!(
            m.signature_hex(),
            "d27db2fd1f22760e4c3dae8137e2d8fc1df6c0741c18aed4b97256bf78d1f55c"
        );
        assert_eq!(
            m.caveat_packets()[2].value_as_text(),
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA027FAuBYhtHwJ58FX6UlVNFtFsGxQHS7uD_w_dedwv4Jjw7UorCREw5rXbRqIKhr"
        );
    }

    #[test]
    fn test_third_party_caveat_without_location() {
        let m = MacaroonBuilder::create(LOCATION, SECRET, IDENTIFIER)
            .unwrap()
            .add_third_party_caveat("", "caveat key", "caveat id")
            .unwrap()
            .build();
        let caveat = m.caveats().next().unwrap();
        assert!(caveat.is_third_party());
        assert_eq!(caveat.location, None);
    }

    #[test]
    fn test_third_party_nonces_are_fresh() {
        let builder = || {
            MacaroonBuilder::create(LOCATION, SECRET, IDENTIFIER)
                .unwrap()
                .add_third_party_caveat("http://auth/", "caveat key", "caveat id")
                .unwrap()
                .build()
        };
        let (a, b) = (builder(), builder());
        assert_ne!(a.caveat_packets()[1], b.caveat_packets()[1]);
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn test_bind_rewrites_only_signature() {
        let root = MacaroonBuilder::create(LOCATION, SECRET, IDENTIFIER).unwrap();
        let discharge = MacaroonBuilder::create("http://auth/", "key", "id")
            .unwrap()
            .add_first_party_caveat("user = Alice")
            .unwrap()
            .build();

        let bound = root.bind(&discharge).unwrap();
        assert_eq!(bound.identifier(), discharge.identifier());
        assert_eq!(bound.location(), discharge.location());
        assert_eq!(bound.caveat_packets(), discharge.caveat_packets());
        assert_ne!(bound.signature(), discharge.signature());

        let expected = keys::bind_signature(
            &crypto::DefaultCrypto,
            root.macaroon().signature(),
            discharge.signature(),
        )
        .unwrap();
        assert_eq!(bound.signature(), &expected);
    }

    #[test]
    fn test_oversized_identifier_rejected() {
        let identifier = "x".repeat(32768);
        let err = MacaroonBuilder::create(LOCATION, SECRET, &identifier)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            MacaroonError::FieldTooLong {
                field: "identifier",
                len: 32768,
                max: 32768
            }
        ));

        let identifier = "x".repeat(32767);
        assert!(MacaroonBuilder::create(LOCATION, SECRET, &identifier).is_ok());
    }

    #[test]
    fn test_oversized_location_rejected() {
        let location = "l".repeat(40000);
        assert!(matches!(
            MacaroonBuilder::create(&location, SECRET, IDENTIFIER),
            Err(MacaroonError::FieldTooLong { field: "location", .. })
        ));
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let limits = Limits {
            max_caveats: 0,
            ..Limits::default()
        };
        let result = MacaroonBuilder::create_with(
            LOCATION,
            SECRET,
            IDENTIFIER,
            crypto::default_provider(),
            limits,
        );
        assert!(matches!(result, Err(MacaroonError::Config(_))));
    }

    #[test]
    fn test_caveat_limit_enforced() {
        let limits = Limits {
            max_caveats: 2,
            ..Limits::default()
        };
        let builder = MacaroonBuilder::create_with(
            LOCATION,
            SECRET,
            IDENTIFIER,
            crypto::default_provider(),
            limits,
        )
        .unwrap()
        .add_first_party_caveat("a = 1")
        .unwrap()
        .add_third_party_caveat("http://auth/", "key", "id")
        .unwrap();

        assert!(matches!(
            builder.add_first_party_caveat("c = 3"),
            Err(MacaroonError::TooManyCaveats { max: 2 })
        ));
    }
}
