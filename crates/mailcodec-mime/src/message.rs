//! MIME message tree.

use std::fmt;
use std::io::Read;

use crate::config::DecodeOptions;
use crate::content_type::ContentType;
use crate::encoder::{encode_base64_lines, encode_quoted_printable, select_transfer_encoding};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::parser;
use crate::source::{ByteSource, ReaderSource, SliceSource};
use crate::words::charset_to_string;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
    /// An unrecognised token; the body is passed through undecoded.
    Unknown,
}

impl TransferEncoding {
    /// Parses a `Content-Transfer-Encoding` value.
    ///
    /// Matching is case-insensitive. Unrecognised tokens give
    /// [`TransferEncoding::Unknown`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::Unknown,
        }
    }

    /// Returns true for the identity encodings allowed on composite types.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        matches!(self, Self::SevenBit | Self::EightBit | Self::Binary)
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
            Self::Unknown => write!(f, "x-unknown"),
        }
    }
}

/// A decoded MIME entity.
///
/// Leaves carry a decoded body; multiparts carry child entities instead.
/// Bodies of `message/*` parts are kept as bytes; see
/// [`Message::encapsulated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    headers: Headers,
    content_type: ContentType,
    transfer_encoding: TransferEncoding,
    body: Option<Vec<u8>>,
    parts: Vec<Self>,
}

impl Message {
    pub(crate) const fn leaf(
        headers: Headers,
        content_type: ContentType,
        transfer_encoding: TransferEncoding,
        body: Vec<u8>,
    ) -> Self {
        Self {
            headers,
            content_type,
            transfer_encoding,
            body: Some(body),
            parts: Vec::new(),
        }
    }

    pub(crate) const fn composite(
        headers: Headers,
        content_type: ContentType,
        transfer_encoding: TransferEncoding,
        parts: Vec<Self>,
    ) -> Self {
        Self {
            headers,
            content_type,
            transfer_encoding,
            body: None,
            parts,
        }
    }

    /// Creates a single-part message from headers and a decoded body.
    ///
    /// An invalid or missing `Content-Type` falls back to
    /// `text/plain; charset=us-ascii`.
    #[must_use]
    pub fn single_part(headers: Headers, body: Vec<u8>) -> Self {
        let content_type = headers
            .get("content-type")
            .and_then(|v| ContentType::parse(v).ok())
            .unwrap_or_else(ContentType::default_text);
        let encoding = select_transfer_encoding(&body, false);
        Self::leaf(headers, content_type, encoding, body)
    }

    /// Creates a multipart message.
    ///
    /// # Errors
    ///
    /// Returns an error if the `Content-Type` header is missing, is not
    /// multipart, or has no boundary.
    pub fn multipart(headers: Headers, parts: Vec<Self>) -> Result<Self> {
        let content_type = headers
            .get("content-type")
            .ok_or_else(|| Error::structural("multipart message needs a Content-Type"))
            .and_then(ContentType::parse)?;
        if !content_type.is_multipart() {
            return Err(Error::InvalidContentType(format!(
                "{} is not multipart",
                content_type.mime_type()
            )));
        }
        let boundary = content_type
            .boundary()
            .ok_or_else(|| Error::structural("multipart Content-Type has no boundary"))?;
        crate::boundary::validate_boundary(boundary)?;
        Ok(Self::composite(
            headers,
            content_type,
            TransferEncoding::SevenBit,
            parts,
        ))
    }

    /// Parses a message with strict options.
    ///
    /// # Errors
    ///
    /// Returns the first structural, encoding or length error found.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::parse_with(raw, &DecodeOptions::default())
    }

    /// Parses a message with the given options.
    ///
    /// # Errors
    ///
    /// Returns the first structural, encoding or length error found.
    pub fn parse_with(raw: &[u8], options: &DecodeOptions) -> Result<Self> {
        Self::from_source(SliceSource::new(raw), options)
    }

    /// Parses a message from a reader.
    ///
    /// # Errors
    ///
    /// As for [`Message::parse_with`], plus I/O errors from the reader.
    pub fn from_reader<R: Read>(reader: R, options: &DecodeOptions) -> Result<Self> {
        Self::from_source(ReaderSource::new(reader), options)
    }

    /// Parses a message from any byte source.
    ///
    /// # Errors
    ///
    /// As for [`Message::parse_with`].
    pub fn from_source<S: ByteSource>(source: S, options: &DecodeOptions) -> Result<Self> {
        parser::parse_message(source, options)
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Gets the first value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the effective content type after defaulting.
    #[must_use]
    pub const fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Returns the transfer encoding the body was decoded from.
    #[must_use]
    pub const fn transfer_encoding(&self) -> TransferEncoding {
        self.transfer_encoding
    }

    /// Returns the decoded body of a leaf; `None` for multiparts.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Returns the child parts; empty for leaves.
    #[must_use]
    pub fn parts(&self) -> &[Self] {
        &self.parts
    }

    /// Checks if this is a multipart message.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type.is_multipart()
    }

    /// Gets the Subject header with encoded words expanded.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers.get_decoded("subject")
    }

    /// Gets the body as text using the declared charset.
    ///
    /// Unsupported charsets are read as UTF-8 with replacement.
    ///
    /// # Errors
    ///
    /// Returns an error if this is a multipart message.
    pub fn body_text(&self) -> Result<String> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| Error::structural("use parts() for multipart messages"))?;
        let charset = self.content_type.charset().unwrap_or("us-ascii");
        Ok(charset_to_string(charset, body)
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned()))
    }

    /// Parses the body of a `message/*` part as a message of its own.
    ///
    /// Returns `None` for other content types.
    #[must_use]
    pub fn encapsulated(&self, options: &DecodeOptions) -> Option<Result<Self>> {
        if !self.content_type.is_message() {
            return None;
        }
        self.body.as_deref().map(|body| Self::parse_with(body, options))
    }

    /// Finds the first text/plain leaf, searching depth-first.
    ///
    /// # Errors
    ///
    /// Returns an error if no text part is found.
    pub fn text_part(&self) -> Result<String> {
        self.find_leaf("plain")
            .ok_or_else(|| Error::structural("no text/plain part found"))?
            .body_text()
    }

    /// Finds the first text/html leaf, searching depth-first.
    ///
    /// # Errors
    ///
    /// Returns an error if no HTML part is found.
    pub fn html_part(&self) -> Result<String> {
        self.find_leaf("html")
            .ok_or_else(|| Error::structural("no text/html part found"))?
            .body_text()
    }

    fn find_leaf(&self, sub_type: &str) -> Option<&Self> {
        if self.body.is_some() {
            let ct = &self.content_type;
            return (ct.is_text() && ct.sub_type.eq_ignore_ascii_case(sub_type)).then_some(self);
        }
        self.parts.iter().find_map(|p| p.find_leaf(sub_type))
    }

    /// Serialises the header block, including the blank line.
    #[must_use]
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut out = self.headers.to_wire().into_bytes();
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Serialises the message.
    ///
    /// Leaf bodies are re-encoded with an encoding picked by
    /// [`select_transfer_encoding`], and `Content-Transfer-Encoding` is
    /// rewritten to match. Multiparts keep their boundary unless a part's
    /// content contains a line starting with it; then a fresh boundary is
    /// chosen and `Content-Type` is rewritten.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        if let Some(body) = &self.body {
            let mut encoding = select_transfer_encoding(body, false);
            if self.content_type.is_message() && !encoding.is_identity() {
                encoding = TransferEncoding::Binary;
            }
            let mut headers = self.headers.clone();
            if encoding == TransferEncoding::SevenBit {
                headers.remove("content-transfer-encoding");
            } else {
                headers.set("content-transfer-encoding", encoding.to_string());
            }
            out.extend_from_slice(headers.to_wire().as_bytes());
            out.extend_from_slice(b"\r\n");
            match encoding {
                TransferEncoding::QuotedPrintable => {
                    out.extend_from_slice(encode_quoted_printable(body).as_bytes());
                }
                TransferEncoding::Base64 => {
                    out.extend_from_slice(encode_base64_lines(body).as_bytes());
                }
                _ => out.extend_from_slice(body),
            }
            return;
        }

        let parts: Vec<Vec<u8>> = self
            .parts
            .iter()
            .map(|part| {
                let mut bytes = Vec::new();
                part.write_to(&mut bytes);
                bytes
            })
            .collect();

        let mut boundary = self.content_type.boundary().unwrap_or_default().to_string();
        if parts.iter().any(|p| has_delimiter_line(p, &boundary)) {
            let fresh = fresh_boundary(&parts);
            tracing::debug!(old = %boundary, new = %fresh, "boundary occurs in part content; replacing");
            let content_type = self
                .content_type
                .clone()
                .with_parameter("boundary", fresh.as_str());
            let mut headers = self.headers.clone();
            headers.set("content-type", content_type.to_string());
            out.extend_from_slice(headers.to_wire().as_bytes());
            out.extend_from_slice(b"\r\n");
            boundary = fresh;
        } else {
            out.extend_from_slice(&self.header_bytes());
        }

        for part in &parts {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            out.extend_from_slice(part);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    }
}

/// True if some line of `bytes` starts with `--boundary`, which a parser
/// would take for a delimiter.
fn has_delimiter_line(bytes: &[u8], boundary: &str) -> bool {
    let marker = format!("--{boundary}");
    std::iter::once(0)
        .chain(bytes.iter().enumerate().filter(|&(_, &b)| b == b'\n').map(|(i, _)| i + 1))
        .any(|start| bytes[start..].starts_with(marker.as_bytes()))
}

fn fresh_boundary(parts: &[Vec<u8>]) -> String {
    (0u32..)
        .map(|n| format!("_bound_{n}"))
        .find(|b| !parts.iter().any(|p| has_delimiter_line(p, b)))
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::Unknown);
        assert!(TransferEncoding::Binary.is_identity());
        assert!(!TransferEncoding::Base64.is_identity());
    }

    #[test]
    fn test_message_single_part() {
        let mut headers = Headers::new();
        headers.add("from", "sender@example.com");
        headers.add("to", "recipient@example.com");
        headers.add("subject", "=?utf-8?q?T=C3=A9st?=");

        let message = Message::single_part(headers, b"Hello, World!".to_vec());

        assert_eq!(message.header("from"), Some("sender@example.com"));
        assert_eq!(message.header("To"), Some("recipient@example.com"));
        assert_eq!(message.subject().as_deref(), Some("Tést"));
        assert_eq!(message.body_text().unwrap(), "Hello, World!");
        assert_eq!(message.content_type().mime_type(), "text/plain");
        assert!(!message.is_multipart());
    }

    #[test]
    fn test_message_multipart() {
        let mut headers = Headers::new();
        headers.add("content-type", "multipart/mixed; boundary=abc123");

        let mut part1_headers = Headers::new();
        part1_headers.add("content-type", "text/plain");
        let part1 = Message::single_part(part1_headers, b"Part 1".to_vec());

        let mut part2_headers = Headers::new();
        part2_headers.add("content-type", "text/html");
        let part2 = Message::single_part(part2_headers, b"<p>Part 2</p>".to_vec());

        let message = Message::multipart(headers, vec![part1, part2]).unwrap();

        assert!(message.is_multipart());
        assert_eq!(message.parts().len(), 2);
        assert!(message.body().is_none());
        assert!(message.body_text().is_err());
        assert_eq!(message.text_part().unwrap(), "Part 1");
        assert_eq!(message.html_part().unwrap(), "<p>Part 2</p>");
    }

    #[test]
    fn test_multipart_requires_boundary() {
        let mut headers = Headers::new();
        headers.add("content-type", "multipart/mixed");
        assert!(Message::multipart(headers, Vec::new()).is_err());

        let mut headers = Headers::new();
        headers.add("content-type", "text/plain");
        assert!(Message::multipart(headers, Vec::new()).is_err());
    }

    #[test]
    fn test_body_text_latin1() {
        let mut headers = Headers::new();
        headers.add("content-type", "text/plain; charset=iso-8859-1");
        let message = Message::single_part(headers, b"caf\xe9".to_vec());
        assert_eq!(message.body_text().unwrap(), "café");
    }

    #[test]
    fn test_to_bytes_round_trip() {
        let mut headers = Headers::new();
        headers.add("content-type", "multipart/mixed; boundary=abc123");
        headers.add("subject", "Grüße");

        let mut text_headers = Headers::new();
        text_headers.add("content-type", "text/plain; charset=utf-8");
        let text = Message::single_part(text_headers, "Grüße aus Köln\r\n".as_bytes().to_vec());

        let mut bin_headers = Headers::new();
        bin_headers.add("content-type", "application/octet-stream");
        let binary: Vec<u8> = (0..=255u8).collect();
        let attachment = Message::single_part(bin_headers, binary.clone());

        let message = Message::multipart(headers, vec![text, attachment]).unwrap();
        let wire = message.to_bytes();
        let wire_text = String::from_utf8(wire.clone()).unwrap();
        assert!(wire_text.contains("Subject: =?utf-8?q?Gr=C3=BC=C3=9Fe?=\r\n"));
        assert!(wire_text.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(wire_text.contains("Content-Transfer-Encoding: base64\r\n"));

        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.subject().as_deref(), Some("Grüße"));
        assert_eq!(parsed.parts().len(), 2);
        assert_eq!(parsed.parts()[0].body_text().unwrap(), "Grüße aus Köln\r\n");
        assert_eq!(parsed.parts()[1].body(), Some(binary.as_slice()));
    }

    #[test]
    fn test_delimiter_in_body_gets_fresh_boundary() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n",
            "--b\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n\r\n",
            "one\r\n=2D-b--\r\ntail\r\n",
            "--b\r\n\r\n",
            "second\r\n",
            "--b--\r\n"
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.parts()[0].body(), Some(&b"one\r\n--b--\r\ntail"[..]));

        let reparsed = Message::parse(&message.to_bytes()).unwrap();
        assert_eq!(reparsed.content_type().boundary(), Some("_bound_0"));
        assert_eq!(reparsed.parts().len(), 2);
        assert_eq!(reparsed.parts()[0].body(), message.parts()[0].body());
        assert_eq!(reparsed.parts()[1].body(), Some(&b"second"[..]));
    }

    #[test]
    fn test_nested_fresh_boundaries_do_not_collide() {
        let mut leaf_headers = Headers::new();
        leaf_headers.add("content-type", "application/octet-stream");
        let leaf = Message::single_part(leaf_headers, b"--in\r\n--out\r\n".to_vec());

        let mut inner_headers = Headers::new();
        inner_headers.add("content-type", "multipart/mixed; boundary=in");
        let inner = Message::multipart(inner_headers, vec![leaf]).unwrap();

        let mut outer_headers = Headers::new();
        outer_headers.add("content-type", "multipart/mixed; boundary=out");
        let outer = Message::multipart(outer_headers, vec![inner]).unwrap();

        let reparsed = Message::parse(&outer.to_bytes()).unwrap();
        let inner = &reparsed.parts()[0];
        assert_ne!(reparsed.content_type().boundary(), inner.content_type().boundary());
        assert_eq!(inner.parts()[0].body(), Some(&b"--in\r\n--out\r\n"[..]));
    }

    #[test]
    fn test_quoted_boundary_spaces_survive() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"a  b\"\r\n\r\n",
            "--a  b\r\n\r\n",
            "x\r\n",
            "--a  b--\r\n"
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        let wire = message.to_bytes();
        assert!(String::from_utf8_lossy(&wire).contains("boundary=\"a  b\""));

        let reparsed = Message::parse(&wire).unwrap();
        assert_eq!(reparsed.content_type().boundary(), Some("a  b"));
        assert_eq!(reparsed.parts()[0].body(), Some(&b"x"[..]));
    }

    #[test]
    fn test_header_bytes() {
        let mut headers = Headers::new();
        headers.add("message-id", "<1@example.com>");
        let message = Message::single_part(headers, Vec::new());
        assert_eq!(message.header_bytes(), b"Message-ID: <1@example.com>\r\n\r\n");
        assert_eq!(message.to_bytes(), b"Message-ID: <1@example.com>\r\n\r\n");
    }
}
