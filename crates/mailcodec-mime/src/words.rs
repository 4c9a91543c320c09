//! String decoders for header values.
//!
//! B and Q encodings (RFC 2047 §4) for encoded words, percent-encoding for
//! RFC 2231 extended parameters, and encoded-word expansion of whole
//! header values.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{Error, Result};
use crate::transform::hex_value;

/// Base64 engine for B-encoded words: padding optional, stray trailing bits
/// tolerated.
const B_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decodes the text of a B-encoded word.
///
/// # Errors
///
/// Returns an error if the text is not valid base64.
pub fn decode_b(text: &str) -> Result<Vec<u8>> {
    B_ENGINE.decode(text.trim()).map_err(Into::into)
}

/// Decodes the text of a Q-encoded word.
///
/// `_` is a space and `=XX` is a byte. With `lenient`, a bad escape or a
/// forbidden character becomes `?` instead of an error.
///
/// # Errors
///
/// Returns [`Error::MalformedEscape`] for a bad escape and
/// [`Error::InvalidCharacter`] for whitespace, `?` or 8-bit bytes.
pub fn decode_q(text: &str, lenient: bool) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_value);
                let lo = bytes.get(i + 2).copied().and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
                if !lenient {
                    return Err(Error::escape(format!("invalid Q-encoding escape at {i}")));
                }
                out.push(b'?');
            }
            b'!'..=b'~' if b != b'?' => out.push(b),
            _ if lenient => out.push(b'?'),
            _ => {
                return Err(Error::InvalidCharacter {
                    byte: b,
                    context: "Q-encoded word",
                });
            }
        }
        i += 1;
    }
    Ok(out)
}

/// Decodes RFC 2231 percent-encoding.
///
/// # Errors
///
/// Without `lenient`, a `%` not followed by two hex digits is an error;
/// with it, the `%` is kept literally.
pub fn percent_decode(text: &str, lenient: bool) -> Result<Vec<u8>> {
    if !lenient {
        let bytes = text.as_bytes();
        for (i, _) in text.match_indices('%') {
            let valid = bytes.get(i + 1).copied().and_then(hex_value).is_some()
                && bytes.get(i + 2).copied().and_then(hex_value).is_some();
            if !valid {
                return Err(Error::escape(format!("invalid percent escape at {i}")));
            }
        }
    }
    Ok(percent_encoding::percent_decode_str(text).collect())
}

/// Converts bytes in a named charset to a string.
///
/// Only charsets that need no conversion table are supported; anything
/// else returns `None`.
#[must_use]
pub fn charset_to_string(charset: &str, bytes: &[u8]) -> Option<String> {
    match charset.trim().to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => Some(String::from_utf8_lossy(bytes).into_owned()),
        "iso-8859-1" | "iso_8859-1" | "latin1" | "l1" => {
            Some(bytes.iter().map(|&b| char::from(b)).collect())
        }
        _ => None,
    }
}

/// Decodes an RFC 2231 extended value (`charset'language'%XX...`).
///
/// # Errors
///
/// Returns an error if the value is not of the extended form, has a bad
/// percent escape, or names an unsupported charset.
pub fn decode_extended_value(value: &str) -> Result<String> {
    let mut pieces = value.splitn(3, '\'');
    let (Some(charset), Some(_language), Some(encoded)) =
        (pieces.next(), pieces.next(), pieces.next())
    else {
        return Err(Error::escape("extended parameter value lacks charset'language'"));
    };
    let bytes = percent_decode(encoded, false)?;
    let charset = if charset.is_empty() { "us-ascii" } else { charset };
    charset_to_string(charset, &bytes)
        .ok_or_else(|| Error::escape(format!("unsupported charset {charset}")))
}

/// Parses one encoded word at the start of `s`.
///
/// Returns the decoded text and the number of bytes consumed.
fn parse_encoded_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let q1 = inner.find('?')?;
    let charset = &inner[..q1];
    let rest = inner[q1 + 1..].as_bytes();
    if charset.is_empty() || rest.len() < 2 || rest[1] != b'?' {
        return None;
    }
    let encoding = rest[0];
    let text_start = 2 + q1 + 3;
    let end = s[text_start..].find("?=")?;
    let text = &s[text_start..text_start + end];
    if text.contains(|c: char| c.is_ascii_whitespace()) {
        return None;
    }
    let bytes = match encoding.to_ascii_uppercase() {
        b'B' => decode_b(text).ok()?,
        b'Q' => decode_q(text, false).ok()?,
        _ => return None,
    };
    // RFC 2231 §5 allows charset*language.
    let charset = charset.split('*').next().unwrap_or(charset);
    let decoded = charset_to_string(charset, &bytes)?;
    Some((decoded, text_start + end + 2))
}

/// Expands RFC 2047 encoded words in a header value.
///
/// Words that fail to decode, or use an unsupported charset, are kept as
/// written. Whitespace between two adjacent encoded words is dropped.
#[must_use]
pub fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;
    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, len)) = parse_encoded_word(candidate) {
            if !(after_word && before.chars().all(|c| c == ' ' || c == '\t')) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[len..];
            after_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_b() {
        assert_eq!(decode_b("SMOpbGxv").unwrap(), "Héllo".as_bytes());
        assert_eq!(decode_b("SGk").unwrap(), b"Hi");
        assert_eq!(decode_b("SGk=").unwrap(), b"Hi");
        assert!(decode_b("S").is_err());
    }

    #[test]
    fn test_decode_q() {
        assert_eq!(decode_q("H=C3=A9llo_world", false).unwrap(), "Héllo world".as_bytes());
        assert!(matches!(decode_q("a=G1", false), Err(Error::MalformedEscape(_))));
        assert_eq!(decode_q("a=G1", true).unwrap(), b"a?G1");
        assert!(decode_q("a b", false).is_err());
        assert_eq!(decode_q("a b", true).unwrap(), b"a?b");
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b", false).unwrap(), b"a b");
        assert_eq!(percent_decode("%E2%82%AC", false).unwrap(), "€".as_bytes());
        assert!(percent_decode("50%", false).is_err());
        assert!(percent_decode("%zz", false).is_err());
        assert_eq!(percent_decode("50%", true).unwrap(), b"50%");
    }

    #[test]
    fn test_decode_extended_value() {
        assert_eq!(
            decode_extended_value("utf-8''%E2%82%AC%20rates").unwrap(),
            "€ rates"
        );
        assert_eq!(
            decode_extended_value("iso-8859-1'en'caf%E9").unwrap(),
            "café"
        );
        assert!(decode_extended_value("no-quotes").is_err());
        assert!(decode_extended_value("koi8-r''%C1").is_err());
    }

    #[test]
    fn test_decode_encoded_words() {
        assert_eq!(decode_encoded_words("Hello"), "Hello");
        assert_eq!(decode_encoded_words("=?utf-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_encoded_words("=?UTF-8?Q?H=C3=A9llo?= world"), "Héllo world");
        assert_eq!(
            decode_encoded_words("=?utf-8?q?a?= =?utf-8?q?b?="),
            "ab"
        );
        assert_eq!(
            decode_encoded_words("Re: =?iso-8859-1*fr?q?caf=E9?="),
            "Re: café"
        );
    }

    #[test]
    fn test_undecodable_words_kept() {
        assert_eq!(decode_encoded_words("=?koi8-r?q?abc?="), "=?koi8-r?q?abc?=");
        assert_eq!(decode_encoded_words("a =? b"), "a =? b");
        assert_eq!(decode_encoded_words("=?utf-8?x?abc?="), "=?utf-8?x?abc?=");
    }
}
