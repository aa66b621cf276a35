//! V1: base64url over a sequence of length-prefixed text packets.
//!
//! Each packet is four lowercase hex digits giving the length of the whole
//! packet (header and trailing newline included), then `name SP payload LF`.

use patisserie_core::Limits;

use super::base64;
use crate::crypto::{Digest, HASH_BYTES};
use crate::error::MacaroonError;
use crate::macaroon::{self, Macaroon};
use crate::packet::{CaveatPacket, PacketKind};

const PACKET_PREFIX_LENGTH: usize = 4;

/// Smallest decoded stream that can hold a signature packet.
const MIN_DECODED_LENGTH: usize = HASH_BYTES + 1 + "signature".len();

pub(super) fn encode(macaroon: &Macaroon, limits: &Limits) -> Result<String, MacaroonError> {
    let mut out = Vec::new();
    if let Some(location) = macaroon.location() {
        write_packet(&mut out, PacketKind::Location, location.as_bytes(), limits)?;
    }
    write_packet(&mut out, PacketKind::Identifier, macaroon.identifier(), limits)?;
    for packet in macaroon.caveat_packets() {
        write_packet(&mut out, packet.kind(), packet.raw_value(), limits)?;
    }
    write_packet(&mut out, PacketKind::Signature, macaroon.signature(), limits)?;
    Ok(base64::encode(&out))
}

fn write_packet(
    out: &mut Vec<u8>,
    kind: PacketKind,
    payload: &[u8],
    limits: &Limits,
) -> Result<(), MacaroonError> {
    let name = kind.field_name();
    let size = PACKET_PREFIX_LENGTH + name.len() + 1 + payload.len() + 1;
    if size > limits.max_packet_length {
        return Err(MacaroonError::FieldTooLong {
            field: name,
            len: size,
            max: limits.max_packet_length,
        });
    }
    out.extend_from_slice(format!("{size:04x}").as_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload);
    out.push(b'\n');
    Ok(())
}

pub(super) fn decode(input: &str, limits: &Limits) -> Result<Macaroon, MacaroonError> {
    let bytes = base64::decode(input)?;
    if bytes.len() < MIN_DECODED_LENGTH {
        return Err(MacaroonError::malformed(format!(
            "{} bytes is too short, a signature packet alone needs {MIN_DECODED_LENGTH}",
            bytes.len()
        )));
    }

    let mut reader = PacketReader { buf: &bytes, pos: 0 };
    let mut location = None;
    let mut identifier = None;
    let mut caveats = Vec::new();
    let mut signature: Option<Digest> = None;

    while let Some((kind, payload)) = reader.next_packet(limits)? {
        if signature.is_some() {
            return Err(MacaroonError::malformed("packet after signature"));
        }
        match kind {
            PacketKind::Location => {
                if location.is_some() || identifier.is_some() {
                    return Err(MacaroonError::malformed("unexpected location packet"));
                }
                let text = String::from_utf8(payload.to_vec())
                    .map_err(|_| MacaroonError::malformed("location is not UTF-8"))?;
                location = Some(text);
            }
            PacketKind::Identifier => {
                if identifier.is_some() {
                    return Err(MacaroonError::malformed("duplicate identifier packet"));
                }
                identifier = Some(payload.to_vec());
            }
            PacketKind::Signature => {
                if identifier.is_none() {
                    return Err(MacaroonError::malformed("signature before identifier"));
                }
                let digest = Digest::try_from(payload).map_err(|_| {
                    MacaroonError::malformed(format!(
                        "signature is {} bytes, expected {HASH_BYTES}",
                        payload.len()
                    ))
                })?;
                signature = Some(digest);
            }
            PacketKind::Cid | PacketKind::Vid | PacketKind::Cl => {
                if identifier.is_none() {
                    return Err(MacaroonError::malformed("caveat before identifier"));
                }
                caveats.push(CaveatPacket::new(kind, payload));
            }
        }
    }

    let identifier = identifier.ok_or_else(|| MacaroonError::malformed("missing identifier"))?;
    let signature = signature.ok_or_else(|| MacaroonError::malformed("missing signature"))?;
    macaroon::check_caveat_packets(&caveats, limits)?;

    Ok(Macaroon::from_parts(location, identifier, caveats, signature))
}

struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    fn next_packet(
        &mut self,
        limits: &Limits,
    ) -> Result<Option<(PacketKind, &'a [u8])>, MacaroonError> {
        let remaining = &self.buf[self.pos..];
        if remaining.is_empty() {
            return Ok(None);
        }
        if remaining.len() < PACKET_PREFIX_LENGTH {
            return Err(MacaroonError::malformed(format!(
                "not enough header bytes, needed {PACKET_PREFIX_LENGTH} but {} remain",
                remaining.len()
            )));
        }

        let size = parse_size(&remaining[..PACKET_PREFIX_LENGTH])?;
        if size > limits.max_packet_length {
            return Err(MacaroonError::malformed(format!(
                "packet of {size} bytes exceeds {}",
                limits.max_packet_length
            )));
        }
        if size > remaining.len() {
            return Err(MacaroonError::malformed(format!(
                "packet needs {size} bytes but only {} remain",
                remaining.len()
            )));
        }
        if size <= PACKET_PREFIX_LENGTH {
            return Err(MacaroonError::malformed(format!("packet size {size} is too small")));
        }

        let Some((&b'\n', body)) = remaining[PACKET_PREFIX_LENGTH..size].split_last() else {
            return Err(MacaroonError::malformed("packet is not newline terminated"));
        };
        let separator = body
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| MacaroonError::malformed("packet has no field separator"))?;
        let name = &body[..separator];
        let kind = PacketKind::from_field_name(name).ok_or_else(|| {
            MacaroonError::malformed(format!(
                "unknown field {:?}",
                String::from_utf8_lossy(name)
            ))
        })?;

        self.pos += size;
        Ok(Some((kind, &body[separator + 1..])))
    }
}

fn parse_size(header: &[u8]) -> Result<usize, MacaroonError> {
    header.iter().try_fold(0usize, |acc, &b| {
        let digit = (b as char)
            .to_digit(16)
            .ok_or_else(|| MacaroonError::malformed("packet header is not hexadecimal"))?;
        Ok(acc * 16 + digit as usize)
    })
}
