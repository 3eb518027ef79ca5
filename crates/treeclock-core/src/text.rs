//! Text encoding for stamps: the binary wire format, hex-encoded behind
//! a short prefix. Fits logs, HTTP headers, and line-based stores.

use crate::error::{Error, Result};
use crate::tree::Stamp;

/// Prefix identifying a text-encoded stamp; the digit tracks the wire
/// version.
pub const TEXT_PREFIX: &str = "itc:v1:";

/// Encode a stamp as `itc:v1:<hex>`.
///
/// # Errors
///
/// [`Error::CorruptId`] when the stamp's ID is not in normal form.
pub fn to_text(stamp: &Stamp) -> Result<String> {
    let bytes = stamp.to_bytes()?;
    Ok(format!("{TEXT_PREFIX}{}", encode_hex(&bytes)))
}

/// Decode a stamp from its `itc:v1:<hex>` form.
///
/// # Errors
///
/// [`Error::InvalidParam`] for a missing prefix or malformed hex, plus
/// any error of the binary decoder.
pub fn from_text(raw: &str) -> Result<Stamp> {
    let encoded = raw
        .strip_prefix(TEXT_PREFIX)
        .ok_or(Error::InvalidParam("missing text-stamp prefix"))?;
    let bytes = decode_hex(encoded)?;
    Stamp::deserialize(&bytes)
}

fn encode_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0F)] as char);
    }
    out
}

fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    if raw.len() % 2 != 0 {
        return Err(Error::InvalidParam("odd-length hex payload"));
    }
    let digits = raw.as_bytes();
    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks_exact(2) {
        let hi = decode_hex_nibble(pair[0])?;
        let lo = decode_hex_nibble(pair[1])?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn decode_hex_nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error::InvalidParam("non-hex digit in text stamp")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_roundtrip() {
        let (mut a, mut b) = Stamp::seed().fork();
        a.event().expect("event");
        b.event().expect("event");
        let stamp = a.join(&b.peek()).expect("join");

        let encoded = to_text(&stamp).expect("encode");
        assert!(encoded.starts_with(TEXT_PREFIX));
        assert_eq!(from_text(&encoded), Ok(stamp));
    }

    #[test]
    fn seed_text_is_stable() {
        // version 1, header 0x11, lengths 1/1, seed id, zero event
        assert_eq!(
            to_text(&Stamp::seed()),
            Ok("itc:v1:011101010100".to_string())
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            from_text("itc:v1:zz"),
            Err(Error::InvalidParam("non-hex digit in text stamp"))
        );
        assert_eq!(
            from_text("itc:v1:abc"),
            Err(Error::InvalidParam("odd-length hex payload"))
        );
        assert_eq!(
            from_text("itc:AQ"),
            Err(Error::InvalidParam("missing text-stamp prefix"))
        );
    }

    #[test]
    fn uppercase_hex_accepted() {
        let lower = to_text(&Stamp::seed()).expect("encode");
        let upper: String = lower
            .strip_prefix(TEXT_PREFIX)
            .expect("prefix")
            .to_uppercase();
        assert_eq!(
            from_text(&format!("{TEXT_PREFIX}{upper}")),
            Ok(Stamp::seed())
        );
    }
}
