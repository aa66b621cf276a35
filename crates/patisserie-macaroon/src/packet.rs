//! Tagged fields that make up a macaroon.

use base64::Engine;
use std::borrow::Cow;

use crate::serialization::base64::URL_SAFE_NO_PAD;

/// The six field names of the packet format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Location,
    Identifier,
    Signature,
    Cid,
    Vid,
    Cl,
}

impl PacketKind {
    /// Field name as written in the V1 format and in `inspect` output.
    pub fn field_name(self) -> &'static str {
        match self {
            PacketKind::Location => "location",
            PacketKind::Identifier => "identifier",
            PacketKind::Signature => "signature",
            PacketKind::Cid => "cid",
            PacketKind::Vid => "vid",
            PacketKind::Cl => "cl",
        }
    }

    /// Parse a V1 field name.
    pub fn from_field_name(name: &[u8]) -> Option<Self> {
        match name {
            b"location" => Some(PacketKind::Location),
            b"identifier" => Some(PacketKind::Identifier),
            b"signature" => Some(PacketKind::Signature),
            b"cid" => Some(PacketKind::Cid),
            b"vid" => Some(PacketKind::Vid),
            b"cl" => Some(PacketKind::Cl),
            _ => None,
        }
    }
}

/// A field name paired with an opaque payload.
///
/// Equality compares kind and bytes. `Vid` and `Signature` payloads are raw
/// bytes; the rest are UTF-8 text by convention and decoded only on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaveatPacket {
    Location(Vec<u8>),
    Identifier(Vec<u8>),
    Signature(Vec<u8>),
    Cid(Vec<u8>),
    Vid(Vec<u8>),
    Cl(Vec<u8>),
}

impl CaveatPacket {
    /// Build a packet of the given kind.
    pub fn new(kind: PacketKind, value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        match kind {
            PacketKind::Location => CaveatPacket::Location(value),
            PacketKind::Identifier => CaveatPacket::Identifier(value),
            PacketKind::Signature => CaveatPacket::Signature(value),
            PacketKind::Cid => CaveatPacket::Cid(value),
            PacketKind::Vid => CaveatPacket::Vid(value),
            PacketKind::Cl => CaveatPacket::Cl(value),
        }
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            CaveatPacket::Location(_) => PacketKind::Location,
            CaveatPacket::Identifier(_) => PacketKind::Identifier,
            CaveatPacket::Signature(_) => PacketKind::Signature,
            CaveatPacket::Cid(_) => PacketKind::Cid,
            CaveatPacket::Vid(_) => PacketKind::Vid,
            CaveatPacket::Cl(_) => PacketKind::Cl,
        }
    }

    pub fn raw_value(&self) -> &[u8] {
        match self {
            CaveatPacket::Location(v)
            | CaveatPacket::Identifier(v)
            | CaveatPacket::Signature(v)
            | CaveatPacket::Cid(v)
            | CaveatPacket::Vid(v)
            | CaveatPacket::Cl(v) => v,
        }
    }

    /// Printable form of the payload: base64url for `vid`, lowercase hex for
    /// `signature`, UTF-8 (lossy) for everything else.
    pub fn value_as_text(&self) -> Cow<'_, str> {
        match self {
            CaveatPacket::Vid(v) => Cow::Owned(URL_SAFE_NO_PAD.encode(v)),
            CaveatPacket::Signature(v) => Cow::Owned(hex::encode(v)),
            other => String::from_utf8_lossy(other.raw_value()),
        }
    }
}
