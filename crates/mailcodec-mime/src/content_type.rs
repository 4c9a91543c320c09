//! MIME content type handling.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::words::{charset_to_string, percent_decode};

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx). Names are lower-cased.
    pub parameters: BTreeMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// The RFC 2045 default: `text/plain; charset=us-ascii`.
    #[must_use]
    pub fn default_text() -> Self {
        Self::new("text", "plain").with_parameter("charset", "us-ascii")
    }

    /// The default inside a multipart/digest: `message/rfc822`.
    #[must_use]
    pub fn message_rfc822() -> Self {
        Self::new("message", "rfc822")
    }

    /// Creates an application/octet-stream content type.
    #[must_use]
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a message content type.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("message")
    }

    /// Checks if this is multipart/digest.
    #[must_use]
    pub fn is_digest(&self) -> bool {
        self.is_multipart() && self.sub_type.eq_ignore_ascii_case("digest")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`. RFC 2231
    /// extended (`name*=`) and continued (`name*0=`, `name*1*=`) parameters
    /// are reassembled and percent-decoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContentType`] if the type or subtype is
    /// missing or not a token, and [`Error::MalformedEscape`] if an extended
    /// parameter has a bad percent escape.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_with(s, false)
    }

    /// Parses a content type. With `lenient`, a bad percent escape in an
    /// extended parameter is kept literally instead of failing.
    ///
    /// # Errors
    ///
    /// As for [`ContentType::parse`]; with `lenient`, only
    /// [`Error::InvalidContentType`].
    pub fn parse_with(s: &str, lenient: bool) -> Result<Self> {
        let mut segments = split_parameters(s).into_iter();

        // Parse type/subtype
        let type_str = segments.next().unwrap_or_default();
        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("missing subtype in {s:?}")))?;
        let main_type = main_type.trim().to_ascii_lowercase();
        let sub_type = sub_type.trim().to_ascii_lowercase();
        if !is_token(&main_type) || !is_token(&sub_type) {
            return Err(Error::InvalidContentType(format!("invalid media type in {s:?}")));
        }

        let mut content_type = Self::new(main_type, sub_type);
        let mut extended: BTreeMap<String, Vec<Piece>> = BTreeMap::new();

        // Parse parameters
        for param in segments {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = unquote(value.trim());
            match split_extended_key(&key) {
                Some((base, piece_index, is_encoded)) => {
                    extended.entry(base.to_string()).or_default().push(Piece {
                        index: piece_index,
                        encoded: is_encoded,
                        value,
                    });
                }
                None => {
                    content_type.parameters.insert(key, value);
                }
            }
        }

        for (name, mut pieces) in extended {
            pieces.sort_by_key(|p| p.index);
            let value = join_pieces(&pieces, lenient)?;
            content_type.parameters.insert(name, value);
        }

        Ok(content_type)
    }
}

/// One section of an RFC 2231 parameter.
struct Piece {
    index: u32,
    encoded: bool,
    value: String,
}

/// Splits `name*`, `name*N` and `name*N*` into (name, index, encoded).
fn split_extended_key(key: &str) -> Option<(&str, u32, bool)> {
    let (base, rest) = key.split_once('*')?;
    if rest.is_empty() {
        return Some((base, 0, true));
    }
    let (digits, encoded) = rest
        .strip_suffix('*')
        .map_or((rest, false), |d| (d, true));
    let index = digits.parse().ok()?;
    Some((base, index, encoded))
}

fn join_pieces(pieces: &[Piece], lenient: bool) -> Result<String> {
    let mut charset = "us-ascii";
    let mut bytes = Vec::new();
    for (i, piece) in pieces.iter().enumerate() {
        if !piece.encoded {
            bytes.extend_from_slice(piece.value.as_bytes());
            continue;
        }
        let mut text = piece.value.as_str();
        if i == 0 {
            let mut parts = text.splitn(3, '\'');
            if let (Some(cs), Some(_language), Some(rest)) = (parts.next(), parts.next(), parts.next()) {
                if !cs.is_empty() {
                    charset = cs;
                }
                text = rest;
            }
        }
        bytes.extend(percent_decode(text, lenient)?);
    }
    Ok(charset_to_string(charset, &bytes)
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned()))
}

/// Splits on `;` outside quoted strings.
fn split_parameters(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// Removes surrounding quotes and backslash escapes from a quoted string.
fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"') else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            // Quote value if it contains special characters
            if value.is_empty()
                || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
            {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "; {key}=\"{escaped}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_defaults() {
        let ct = ContentType::default_text();
        assert_eq!(ct.mime_type(), "text/plain");
        assert_eq!(ct.charset(), Some("us-ascii"));
        assert!(ContentType::message_rfc822().is_message());
    }

    #[test]
    fn test_multipart_predicates() {
        let ct = ContentType::new("multipart", "mixed").with_parameter("boundary", "boundary123");
        assert_eq!(ct.boundary(), Some("boundary123"));
        assert!(ct.is_multipart());
        assert!(!ct.is_digest());
        assert!(ContentType::new("Multipart", "Digest").is_digest());
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; Charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part;123\"").unwrap();
        assert_eq!(ct.main_type, "multipart");
        assert_eq!(ct.sub_type, "mixed");
        assert_eq!(ct.boundary(), Some("----=_Part;123"));

        let ct = ContentType::parse(r#"text/plain; name="a \"b\"""#).unwrap();
        assert_eq!(ct.parameters.get("name").unwrap(), "a \"b\"");
    }

    #[test]
    fn test_content_type_parse_invalid() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
        assert!(ContentType::parse("te xt/plain").is_err());
    }

    #[test]
    fn test_rfc2231_parameters() {
        let ct = ContentType::parse("application/x-stuff; title*=us-ascii'en-us'This%20is%20fun").unwrap();
        assert_eq!(ct.parameters.get("title").unwrap(), "This is fun");

        let ct = ContentType::parse(concat!(
            "application/x-stuff; ",
            "title*0*=utf-8''caf%C3%A9%20; ",
            "title*1=\"and more\""
        ))
        .unwrap();
        assert_eq!(ct.parameters.get("title").unwrap(), "café and more");

        assert!(matches!(
            ContentType::parse("text/plain; name*=utf-8''bad%G0"),
            Err(Error::MalformedEscape(_))
        ));
        let ct = ContentType::parse_with("text/plain; name*=utf-8''bad%G0", true).unwrap();
        assert_eq!(ct.parameters.get("name").unwrap(), "bad%G0");
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::new("text", "plain").with_parameter("charset", "utf-8");
        assert_eq!(ct.to_string(), "text/plain; charset=utf-8");

        let ct = ContentType::new("multipart", "mixed").with_parameter("boundary", "a  b");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"a  b\"");
    }

    #[test]
    fn test_content_type_with_parameter() {
        let ct = ContentType::new("text", "plain")
            .with_parameter("charset", "iso-8859-1")
            .with_parameter("format", "flowed");

        assert_eq!(ct.charset(), Some("iso-8859-1"));
        assert_eq!(ct.parameters.get("format"), Some(&"flowed".to_string()));
    }
}
