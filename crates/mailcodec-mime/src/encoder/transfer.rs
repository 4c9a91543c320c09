//! Body transfer encodings: selection heuristic and the encoders.

use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::MAX_ENCODED_LINE_LENGTH;
use crate::message::TransferEncoding;

/// How much of a body the selection heuristic looks at.
const SAMPLE_SIZE: usize = 4096;

/// Picks a transfer encoding for a body.
///
/// Only the first 4096 bytes are examined. Clean 7-bit text stays `7bit`.
/// Bare CR or LF, NUL, a line longer than 76 bytes, or whitespace right
/// before a line break forces an encoding; so do high-bit bytes unless
/// `allow_eight_bit` is set. When forced, base64 is chosen if more than a
/// third of the sample is high-bit, quoted-printable otherwise.
#[must_use]
pub fn select_transfer_encoding(body: &[u8], allow_eight_bit: bool) -> TransferEncoding {
    let sample = &body[..body.len().min(SAMPLE_SIZE)];
    let truncated = sample.len() < body.len();
    let mut forced = false;
    let mut high = 0usize;
    let mut line_length = 0usize;
    let mut i = 0;
    while i < sample.len() {
        match sample[i] {
            b'\r' if sample.get(i + 1) == Some(&b'\n') => {
                if i > 0 && matches!(sample[i - 1], b' ' | b'\t') {
                    forced = true;
                }
                line_length = 0;
                i += 2;
                continue;
            }
            // A CR cut off by the sample edge is not evidence of a bare CR.
            b'\r' if truncated && i + 1 == sample.len() => {}
            b'\r' | b'\n' | 0 => forced = true,
            b => {
                if b >= 0x80 {
                    high += 1;
                }
                line_length += 1;
                if line_length > MAX_ENCODED_LINE_LENGTH {
                    forced = true;
                }
            }
        }
        i += 1;
    }

    if !forced && (high == 0 || allow_eight_bit) {
        return if high == 0 {
            TransferEncoding::SevenBit
        } else {
            TransferEncoding::EightBit
        };
    }
    if high * 3 > sample.len() {
        TransferEncoding::Base64
    } else {
        TransferEncoding::QuotedPrintable
    }
}

/// Encodes data as quoted-printable (RFC 2045 §6.7).
///
/// CRLF pairs become hard line breaks; every other byte outside printable
/// ASCII is escaped, as is whitespace at the end of a line or of the data.
/// Output lines never exceed 76 characters.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / 8);
    let mut line_length = 0;
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if byte == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.push_str("\r\n");
            line_length = 0;
            i += 2;
            continue;
        }
        let at_line_end = data.get(i + 1).is_none_or(|&next| next == b'\r' && data.get(i + 2) == Some(&b'\n'));
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !at_line_end,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };
        // A soft break needs one column for the '='.
        let limit = if at_line_end {
            MAX_ENCODED_LINE_LENGTH
        } else {
            MAX_ENCODED_LINE_LENGTH - 1
        };
        if line_length + width > limit {
            out.push_str("=\r\n");
            line_length = 0;
        }
        if literal {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "={byte:02X}");
        }
        line_length += width;
        i += 1;
    }
    out
}

/// Encodes data as Base64 on one line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 wrapped into CRLF-separated 76-column lines.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = encode_base64(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / MAX_ENCODED_LINE_LENGTH * 2);
    for (i, chunk) in encoded.as_bytes().chunks(MAX_ENCODED_LINE_LENGTH).enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        // Base64 output is ASCII.
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}
