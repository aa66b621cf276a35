//! Outer base64 wrapping shared by the V1 and V2 formats.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::borrow::Cow;

use crate::error::MacaroonError;

/// Engine used for every encoding this crate produces.
pub const URL_SAFE_NO_PAD: GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

const URL_SAFE_ANY_PAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode `bytes` as URL-safe base64 without padding.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64 in either alphabet, with or without padding.
pub fn decode(input: &str) -> Result<Vec<u8>, MacaroonError> {
    let trimmed = input.trim();
    let normalized: Cow<'_, str> = if trimmed.contains(['+', '/']) {
        Cow::Owned(trimmed.replace('+', "-").replace('/', "_"))
    } else {
        Cow::Borrowed(trimmed)
    };
    URL_SAFE_ANY_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| MacaroonError::malformed(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_url_safe_unpadded() {
        assert_eq!(encode(&[0xfb, 0xff]), "-_8");
    }

    #[test]
    fn test_decode_accepts_both_alphabets_and_padding() {
        assert_eq!(decode("-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(decode("+/8=").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(decode("MTIzDQo=").unwrap(), b"123\r\n");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode("not base64!"),
            Err(MacaroonError::NotDeserializable(_))
        ));
    }
}
