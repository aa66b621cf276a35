//! V2 JSON: the V2 fields as a JSON object.
//!
//! Binary values use the `*64` keys with base64url text. Decoding also takes
//! the plain `i`, `v` and `s` keys, whose string bytes are used as is.

use patisserie_core::Limits;
use serde::{Deserialize, Serialize};

use super::base64;
use crate::crypto::{Digest, HASH_BYTES};
use crate::error::MacaroonError;
use crate::macaroon::{self, Macaroon};
use crate::packet::CaveatPacket;

const VERSION: u8 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct MacaroonJson {
    #[serde(rename = "v")]
    version: u8,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    #[serde(rename = "i64", default, skip_serializing_if = "Option::is_none")]
    identifier64: Option<String>,
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    caveats: Vec<CaveatJson>,
    #[serde(rename = "s", default, skip_serializing)]
    signature: Option<String>,
    #[serde(rename = "s64", default, skip_serializing_if = "Option::is_none")]
    signature64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CaveatJson {
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    #[serde(rename = "i64", default, skip_serializing_if = "Option::is_none")]
    identifier64: Option<String>,
    #[serde(rename = "v", default, skip_serializing)]
    vid: Option<String>,
    #[serde(rename = "v64", default, skip_serializing_if = "Option::is_none")]
    vid64: Option<String>,
}

/// Text identifiers stay readable; anything else goes under `i64`.
fn split_identifier(id: &[u8]) -> (Option<String>, Option<String>) {
    match std::str::from_utf8(id) {
        Ok(text) => (Some(text.to_string()), None),
        Err(_) => (None, Some(base64::encode(id))),
    }
}

pub(super) fn encode(macaroon: &Macaroon) -> Result<String, MacaroonError> {
    let (identifier, identifier64) = split_identifier(macaroon.identifier());
    let caveats = macaroon
        .caveats()
        .map(|caveat| {
            let (identifier, identifier64) = split_identifier(caveat.id);
            CaveatJson {
                location: caveat
                    .location
                    .map(|l| String::from_utf8_lossy(l).into_owned()),
                identifier,
                identifier64,
                vid: None,
                vid64: caveat.verifier_id.map(base64::encode),
            }
        })
        .collect();

    let json = MacaroonJson {
        version: VERSION,
        location: macaroon.location().map(str::to_string),
        identifier,
        identifier64,
        caveats,
        signature: None,
        signature64: Some(base64::encode(macaroon.signature())),
    };
    serde_json::to_string(&json)
        .map_err(|e| MacaroonError::malformed(format!("JSON encoding failed: {e}")))
}

pub(super) fn decode(input: &str, limits: &Limits) -> Result<Macaroon, MacaroonError> {
    let json: MacaroonJson = serde_json::from_str(input)
        .map_err(|e| MacaroonError::malformed(format!("invalid JSON: {e}")))?;
    if json.version != VERSION {
        return Err(MacaroonError::malformed(format!(
            "unsupported version {}",
            json.version
        )));
    }
    if json.caveats.len() > limits.max_caveats {
        return Err(MacaroonError::malformed(format!(
            "more than {} caveats",
            limits.max_caveats
        )));
    }

    let identifier = pick_binary(json.identifier, json.identifier64, "identifier")?
        .ok_or_else(|| MacaroonError::malformed("missing identifier"))?;
    check_length("identifier", identifier.len(), limits)?;

    let mut packets = Vec::new();
    for caveat in json.caveats {
        let id = pick_binary(caveat.identifier, caveat.identifier64, "caveat identifier")?
            .ok_or_else(|| MacaroonError::malformed("caveat without identifier"))?;
        check_length("caveat identifier", id.len(), limits)?;
        packets.push(CaveatPacket::Cid(id));

        if let Some(vid) = pick_binary(caveat.vid, caveat.vid64, "vid")? {
            check_length("vid", vid.len(), limits)?;
            packets.push(CaveatPacket::Vid(vid));
        }
        if let Some(location) = caveat.location {
            check_length("caveat location", location.len(), limits)?;
            packets.push(CaveatPacket::Cl(location.into_bytes()));
        }
    }

    let raw = pick_binary(json.signature, json.signature64, "signature")?
        .ok_or_else(|| MacaroonError::malformed("missing signature"))?;
    let signature = Digest::try_from(raw.as_slice()).map_err(|_| {
        MacaroonError::malformed(format!(
            "signature is {} bytes, expected {HASH_BYTES}",
            raw.len()
        ))
    })?;

    macaroon::check_caveat_packets(&packets, limits)?;
    Ok(Macaroon::from_parts(json.location, identifier, packets, signature))
}

/// Take a value from its plain key or its `*64` key, but not both.
fn pick_binary(
    plain: Option<String>,
    encoded: Option<String>,
    field: &str,
) -> Result<Option<Vec<u8>>, MacaroonError> {
    match (plain, encoded) {
        (Some(_), Some(_)) => Err(MacaroonError::malformed(format!(
            "{field} given in both plain and base64 form"
        ))),
        (Some(text), None) => Ok(Some(text.into_bytes())),
        (None, Some(b64)) => base64::decode(&b64).map(Some),
        (None, None) => Ok(None),
    }
}

fn check_length(field: &str, len: usize, limits: &Limits) -> Result<(), MacaroonError> {
    if len > limits.max_packet_length {
        return Err(MacaroonError::malformed(format!(
            "{field} of {len} bytes exceeds {}",
            limits.max_packet_length
        )));
    }
    Ok(())
}
