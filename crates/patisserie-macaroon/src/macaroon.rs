//! The macaroon value type.

use patisserie_core::{Limits, MacaroonConfig, SerializationFormat};
use std::borrow::Cow;
use std::fmt::Write;
use std::sync::Arc;

use crate::builder::MacaroonBuilder;
use crate::crypto::{CryptoProvider, Digest};
use crate::error::MacaroonError;
use crate::packet::{CaveatPacket, PacketKind};
use crate::serialization;
use crate::verifier::Verifier;

/// An immutable bearer token.
///
/// `signature` is always the output of the chaining algorithm over
/// `identifier` and `caveat_packets`, in order. Attenuation produces new
/// values; nothing is ever removed from an existing macaroon. `location` is
/// advisory and not covered by the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macaroon {
    location: Option<String>,
    identifier: Vec<u8>,
    caveat_packets: Vec<CaveatPacket>,
    signature: Digest,
}

/// A logical caveat: a `cid` together with the `vid` and `cl` that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caveat<'a> {
    /// Predicate (first-party) or discharge identifier (third-party).
    pub id: &'a [u8],
    /// Encrypted discharge root key, present only on third-party caveats.
    pub verifier_id: Option<&'a [u8]>,
    /// Where to obtain a discharge, present only on third-party caveats.
    pub location: Option<&'a [u8]>,
}

impl Caveat<'_> {
    pub fn is_first_party(&self) -> bool {
        self.verifier_id.is_none()
    }

    pub fn is_third_party(&self) -> bool {
        self.verifier_id.is_some()
    }

    pub fn id_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.id)
    }
}

/// Iterator over the logical caveats of a macaroon.
pub struct Caveats<'a> {
    packets: &'a [CaveatPacket],
}

impl<'a> Iterator for Caveats<'a> {
    type Item = Caveat<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (first, rest) = self.packets.split_first()?;
        let mut caveat = Caveat {
            id: first.raw_value(),
            verifier_id: None,
            location: None,
        };
        let mut consumed = 1;
        for packet in rest {
            match packet {
                CaveatPacket::Vid(v) => caveat.verifier_id = Some(v.as_slice()),
                CaveatPacket::Cl(l) => caveat.location = Some(l.as_slice()),
                _ => break,
            }
            consumed += 1;
        }
        self.packets = &self.packets[consumed..];
        Some(caveat)
    }
}

impl Macaroon {
    /// Assemble a macaroon from parts whose consistency the caller vouches
    /// for: a builder that computed the signature, or a decoder that ran
    /// [`check_caveat_packets`].
    pub(crate) fn from_parts(
        location: Option<String>,
        identifier: Vec<u8>,
        caveat_packets: Vec<CaveatPacket>,
        signature: Digest,
    ) -> Self {
        Self {
            location,
            identifier,
            caveat_packets,
            signature,
        }
    }

    /// Mint a root macaroon with the default crypto provider and limits.
    pub fn create(
        location: &str,
        secret: impl AsRef<[u8]>,
        identifier: impl AsRef<[u8]>,
    ) -> Result<Self, MacaroonError> {
        Ok(MacaroonBuilder::create(location, secret, identifier)?.build())
    }

    /// Return a copy of this macaroon with one more first-party caveat.
    pub fn add_first_party_caveat(
        &self,
        predicate: impl AsRef<[u8]>,
    ) -> Result<Self, MacaroonError> {
        Ok(MacaroonBuilder::modify(self.clone())
            .add_first_party_caveat(predicate)?
            .build())
    }

    /// Return a copy of this macaroon with one more third-party caveat.
    pub fn add_third_party_caveat(
        &self,
        location: &str,
        caveat_key: impl AsRef<[u8]>,
        identifier: impl AsRef<[u8]>,
    ) -> Result<Self, MacaroonError> {
        Ok(MacaroonBuilder::modify(self.clone())
            .add_third_party_caveat(location, caveat_key, identifier)?
            .build())
    }

    /// Bind `discharge` to this macaroon so it can accompany it to a verifier.
    pub fn prepare_for_request(&self, discharge: &Macaroon) -> Result<Self, MacaroonError> {
        MacaroonBuilder::modify(self.clone()).bind(discharge)
    }

    /// Start verifying this macaroon.
    pub fn verifier(&self) -> Verifier<'_> {
        Verifier::new(self)
    }

    /// Start verifying this macaroon with a specific crypto provider.
    pub fn verifier_with_crypto(&self, crypto: Arc<dyn CryptoProvider>) -> Verifier<'_> {
        Verifier::with_crypto(self, crypto)
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    /// Identifier decoded as UTF-8, with invalid sequences replaced.
    pub fn identifier_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.identifier)
    }

    pub fn signature(&self) -> &Digest {
        &self.signature
    }

    pub fn signature_hex(&self) -> String {
        hex::encode(self.signature)
    }

    pub fn caveat_packets(&self) -> &[CaveatPacket] {
        &self.caveat_packets
    }

    pub fn caveats(&self) -> Caveats<'_> {
        Caveats {
            packets: &self.caveat_packets,
        }
    }

    pub fn caveat_count(&self) -> usize {
        self.caveat_packets
            .iter()
            .filter(|p| p.kind() == PacketKind::Cid)
            .count()
    }

    /// Human-readable dump, one `field value` line per packet.
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        if let Some(location) = &self.location {
            let _ = writeln!(out, "location {location}");
        }
        let _ = writeln!(out, "identifier {}", self.identifier_text());
        for packet in &self.caveat_packets {
            let _ = writeln!(
                out,
                "{} {}",
                packet.kind().field_name(),
                packet.value_as_text()
            );
        }
        let _ = writeln!(out, "signature {}", self.signature_hex());
        out
    }

    /// Encode in the given wire format.
    pub fn serialize(&self, format: SerializationFormat) -> Result<String, MacaroonError> {
        self.serialize_with_limits(format, &Limits::default())
    }

    /// Encode in the given wire format, checking packet sizes against `limits`.
    pub fn serialize_with_limits(
        &self,
        format: SerializationFormat,
        limits: &Limits,
    ) -> Result<String, MacaroonError> {
        serialization::serialize(self, format, limits)
    }

    /// Decode from the given wire format.
    pub fn deserialize(input: &str, format: SerializationFormat) -> Result<Self, MacaroonError> {
        Self::deserialize_with_limits(input, format, &Limits::default())
    }

    /// Decode from the given wire format, rejecting input beyond `limits`.
    pub fn deserialize_with_limits(
        input: &str,
        format: SerializationFormat,
        limits: &Limits,
    ) -> Result<Self, MacaroonError> {
        serialization::deserialize(input, format, limits)
    }

    /// Encode in the configured default format, within the configured limits.
    pub fn serialize_with_config(&self, config: &MacaroonConfig) -> Result<String, MacaroonError> {
        self.serialize_with_limits(config.serialization.default_format, &config.limits)
    }

    /// Decode from the configured default format, within the configured limits.
    pub fn deserialize_with_config(
        input: &str,
        config: &MacaroonConfig,
    ) -> Result<Self, MacaroonError> {
        Self::deserialize_with_limits(input, config.serialization.default_format, &config.limits)
    }

    /// Start verifying this macaroon with the configured limits and settings.
    pub fn verifier_with_config(&self, config: &MacaroonConfig) -> Verifier<'_> {
        let mut verifier = Verifier::new(self);
        verifier
            .with_limits(config.limits)
            .with_settings(config.verifier.clone());
        verifier
    }
}

/// Check that decoded caveat packets form well-grouped caveats: each group
/// opens with a `cid` and carries at most one `vid` and one UTF-8 `cl`. The
/// number of groups must stay within `limits`.
pub(crate) fn check_caveat_packets(
    packets: &[CaveatPacket],
    limits: &Limits,
) -> Result<(), MacaroonError> {
    let mut caveats = 0usize;
    let mut seen_vid = false;
    let mut seen_cl = false;

    for packet in packets {
        match packet {
            CaveatPacket::Cid(_) => {
                caveats += 1;
                if caveats > limits.max_caveats {
                    return Err(MacaroonError::malformed(format!(
                        "more than {} caveats",
                        limits.max_caveats
                    )));
                }
                seen_vid = false;
                seen_cl = false;
            }
            CaveatPacket::Vid(_) => {
                if caveats == 0 || seen_vid {
                    return Err(MacaroonError::malformed("vid packet without a caveat"));
                }
                seen_vid = true;
            }
            CaveatPacket::Cl(location) => {
                if caveats == 0 || seen_cl {
                    return Err(MacaroonError::malformed("cl packet without a caveat"));
                }
                if std::str::from_utf8(location).is_err() {
                    return Err(MacaroonError::malformed("cl packet is not UTF-8"));
                }
                seen_cl = true;
            }
            other => {
                return Err(MacaroonError::malformed(format!(
                    "unexpected {} packet among caveats",
                    other.kind().field_name()
                )));
            }
        }
    }
    Ok(())
}
