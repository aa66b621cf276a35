//! V2: base64url over a binary stream of tagged, varint-length fields.
//!
//! ```text
//! 0x02
//! [location] identifier EOS
//! ( [location] identifier [vid] EOS )*
//! EOS
//! signature
//! ```

use patisserie_core::Limits;

use super::base64;
use crate::crypto::{Digest, HASH_BYTES};
use crate::error::MacaroonError;
use crate::macaroon::{self, Macaroon};
use crate::packet::CaveatPacket;

const VERSION: u8 = 2;

const EOS: u8 = 0;
const LOCATION: u8 = 1;
const IDENTIFIER: u8 = 2;
const VID: u8 = 4;
const SIGNATURE: u8 = 6;

pub(super) fn encode(macaroon: &Macaroon, limits: &Limits) -> Result<String, MacaroonError> {
    let mut out = vec![VERSION];

    if let Some(location) = macaroon.location() {
        write_field(&mut out, LOCATION, location.as_bytes(), limits)?;
    }
    write_field(&mut out, IDENTIFIER, macaroon.identifier(), limits)?;
    out.push(EOS);

    for caveat in macaroon.caveats() {
        if let Some(location) = caveat.location {
            write_field(&mut out, LOCATION, location, limits)?;
        }
        write_field(&mut out, IDENTIFIER, caveat.id, limits)?;
        if let Some(vid) = caveat.verifier_id {
            write_field(&mut out, VID, vid, limits)?;
        }
        out.push(EOS);
    }
    out.push(EOS);

    write_field(&mut out, SIGNATURE, macaroon.signature(), limits)?;
    Ok(base64::encode(&out))
}

fn write_field(out: &mut Vec<u8>, tag: u8, value: &[u8], limits: &Limits) -> Result<(), MacaroonError> {
    if value.len() > limits.max_packet_length {
        return Err(MacaroonError::FieldTooLong {
            field: tag_name(tag),
            len: value.len(),
            max: limits.max_packet_length,
        });
    }
    out.push(tag);
    write_varint(out, value.len() as u64);
    out.extend_from_slice(value);
    Ok(())
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn tag_name(tag: u8) -> &'static str {
    match tag {
        LOCATION => "location",
        IDENTIFIER => "identifier",
        VID => "vid",
        SIGNATURE => "signature",
        _ => "field",
    }
}

pub(super) fn decode(input: &str, limits: &Limits) -> Result<Macaroon, MacaroonError> {
    let bytes = base64::decode(input)?;
    let mut reader = FieldReader {
        buf: &bytes,
        pos: 0,
        limits,
    };

    let version = reader.read_byte()?;
    if version != VERSION {
        return Err(MacaroonError::malformed(format!("unsupported version {version}")));
    }

    let location = reader
        .read_optional(LOCATION)?
        .map(|l| String::from_utf8(l.to_vec()))
        .transpose()
        .map_err(|_| MacaroonError::malformed("location is not UTF-8"))?;
    let identifier = reader.read_required(IDENTIFIER)?.to_vec();
    reader.read_end_of_section()?;

    let mut packets = Vec::new();
    let mut count = 0usize;
    while reader.peek()? != EOS {
        count += 1;
        if count > limits.max_caveats {
            return Err(MacaroonError::malformed(format!(
                "more than {} caveats",
                limits.max_caveats
            )));
        }
        let location = reader.read_optional(LOCATION)?;
        let id = reader.read_required(IDENTIFIER)?;
        let vid = reader.read_optional(VID)?;
        reader.read_end_of_section()?;

        packets.push(CaveatPacket::Cid(id.to_vec()));
        if let Some(vid) = vid {
            packets.push(CaveatPacket::Vid(vid.to_vec()));
        }
        if let Some(location) = location {
            packets.push(CaveatPacket::Cl(location.to_vec()));
        }
    }
    reader.read_end_of_section()?;

    let raw = reader.read_required(SIGNATURE)?;
    let signature = Digest::try_from(raw).map_err(|_| {
        MacaroonError::malformed(format!(
            "signature is {} bytes, expected {HASH_BYTES}",
            raw.len()
        ))
    })?;
    if !reader.at_end() {
        return Err(MacaroonError::malformed("trailing bytes after signature"));
    }

    macaroon::check_caveat_packets(&packets, limits)?;
    Ok(Macaroon::from_parts(location, identifier, packets, signature))
}

struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    limits: &'a Limits,
}

impl<'a> FieldReader<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn peek(&self) -> Result<u8, MacaroonError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| MacaroonError::malformed("unexpected end of input"))
    }

    fn read_byte(&mut self) -> Result<u8, MacaroonError> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn read_varint(&mut self) -> Result<u64, MacaroonError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.read_byte()?;
            if shift >= 64 || (shift == 63 && b > 1) {
                return Err(MacaroonError::malformed("field length overflows"));
            }
            value |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn read_end_of_section(&mut self) -> Result<(), MacaroonError> {
        match self.read_byte()? {
            EOS => Ok(()),
            tag => Err(MacaroonError::malformed(format!(
                "expected end of section, found tag {tag}"
            ))),
        }
    }

    fn read_optional(&mut self, tag: u8) -> Result<Option<&'a [u8]>, MacaroonError> {
        if self.peek()? == tag {
            self.read_required(tag).map(Some)
        } else {
            Ok(None)
        }
    }

    fn read_required(&mut self, tag: u8) -> Result<&'a [u8], MacaroonError> {
        let found = self.read_byte()?;
        if found != tag {
            return Err(MacaroonError::malformed(format!(
                "expected {} field, found tag {found}",
                tag_name(tag)
            )));
        }

        let len = self.read_varint()?;
        if len > self.limits.max_packet_length as u64 {
            return Err(MacaroonError::malformed(format!(
                "{} field of {len} bytes exceeds {}",
                tag_name(tag),
                self.limits.max_packet_length
            )));
        }
        let len = len as usize;
        let end = self.pos + len;
        let value = self.buf.get(self.pos..end).ok_or_else(|| {
            MacaroonError::malformed(format!("{} field is truncated", tag_name(tag)))
        })?;
        self.pos = end;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits::default()
    }

    const BARE: &str = "AgETaHR0cDovL2V4YW1wbGUub3JnLwIFa2V5aWQAAAYgfN7nklEcW8b1KEhYBd_psk54XijiqZMB-dcRxgnjjvc";

    #[test]
    fn test_decode_bare() {
        let m = decode(BARE, &limits()).unwrap();
        assert_eq!(m.location(), Some("http://example.org/"));
        assert_eq!(m.identifier(), b"keyid");
        assert_eq!(m.caveat_count(), 0);
        assert_eq!(encode(&m, &limits()).unwrap(), BARE);
    }

    #[test]
    fn test_third_party_caveat_layout() {
        let m = Macaroon::create("", "secret", "id")
            .and_then(|m| m.add_third_party_caveat("http://auth/", "caveat key", "caveat id"))
            .unwrap();
        let raw = base64::decode(&encode(&m, &limits()).unwrap()).unwrap();

        // version, identifier, EOS
        assert_eq!(&raw[..6], &[2, IDENTIFIER, 2, b'i', b'd', EOS]);
        // caveat location comes first within the caveat section
        assert_eq!(raw[6], LOCATION);

        let decoded = decode(&base64::encode(&raw), &limits()).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_varint_encoding() {
        let mut out = Vec::new();
        write_varint(&mut out, 300);
        assert_eq!(out, vec![0xac, 0x02]);

        let mut reader = FieldReader {
            buf: &out,
            pos: 0,
            limits: &Limits::default(),
        };
        assert_eq!(reader.read_varint().unwrap(), 300);
    }

    #[test]
    fn test_varint_overflow_rejected() {
        let buf = [0xffu8; 11];
        let mut reader = FieldReader {
            buf: &buf,
            pos: 0,
            limits: &Limits::default(),
        };
        assert!(reader.read_varint().is_err());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut raw = base64::decode(BARE).unwrap();
        raw[0] = 1;
        assert!(decode(&base64::encode(&raw), &limits()).is_err());
    }

    #[test]
    fn test_oversized_field_rejected() {
        let mut raw = vec![VERSION, IDENTIFIER];
        write_varint(&mut raw, 65536);
        raw.extend(std::iter::repeat_n(b'x', 65536));
        assert!(decode(&base64::encode(&raw), &limits()).is_err());
    }

    #[test]
    fn test_truncated_field_rejected() {
        let raw = [VERSION, IDENTIFIER, 10, b'a', b'b'];
        assert!(decode(&base64::encode(&raw), &limits()).is_err());
    }

    #[test]
    fn test_short_signature_rejected() {
        let mut raw = vec![VERSION, IDENTIFIER, 2, b'i', b'd', EOS, EOS, SIGNATURE, 31];
        raw.extend_from_slice(&[0u8; 31]);
        assert!(decode(&base64::encode(&raw), &limits()).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut raw = vec![VERSION, IDENTIFIER, 2, b'i', b'd', EOS, EOS, SIGNATURE, 32];
        raw.extend_from_slice(&[0u8; 32]);
        assert!(decode(&base64::encode(&raw), &limits()).is_ok());
        raw.push(0);
        assert!(decode(&base64::encode(&raw), &limits()).is_err());
    }

    #[test]
    fn test_caveat_limit_on_decode() {
        let m = Macaroon::create("", "secret", "id")
            .and_then(|m| m.add_first_party_caveat("a = 1"))
            .and_then(|m| m.add_first_party_caveat("b = 2"))
            .unwrap();
        let encoded = encode(&m, &limits()).unwrap();
        let strict = Limits {
            max_caveats: 1,
            ..Limits::default()
        };
        assert!(decode(&encoded, &strict).is_err());
        assert!(decode(&encoded, &limits()).is_ok());
    }
}
