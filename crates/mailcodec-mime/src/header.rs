//! MIME header handling.

use std::fmt;

use crate::config::DecodeOptions;
use crate::encoder::encode_header_field;
use crate::error::{Error, Result};
use crate::source::{ByteSource, Pushback, SliceSource};
use crate::words::decode_encoded_words;

/// Fields whose values are free text; 8-bit bytes in them are replaced
/// rather than rejected.
const UNSTRUCTURED_FIELDS: &[&str] = &["subject", "comments", "content-description"];

/// Returns true if the named field holds unstructured text.
#[must_use]
pub fn is_unstructured(name: &str) -> bool {
    UNSTRUCTURED_FIELDS
        .iter()
        .any(|f| f.eq_ignore_ascii_case(name))
}

/// Ordered collection of email headers.
///
/// Names are stored lower-cased. Insertion order is preserved, including
/// for repeated fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value after any existing fields.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        self.fields.push((name, value.into()));
    }

    /// Sets a header value, replacing any existing values.
    ///
    /// The field keeps the position of its first occurrence.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        match self.fields.iter().position(|(n, _)| *n == name) {
            Some(first) => {
                self.fields[first].1 = value;
                let mut index = 0;
                self.fields.retain(|(n, _)| {
                    let keep = index <= first || *n != name;
                    index += 1;
                    keep
                });
            }
            None => self.fields.push((name, value)),
        }
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Gets the first value with encoded words expanded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_encoded_words)
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a header block from raw bytes with strict options.
    ///
    /// # Errors
    ///
    /// Returns an error if a field is malformed or a line is too long.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut source = Pushback::new(SliceSource::new(raw));
        read_headers(&mut source, &DecodeOptions::default())
    }

    /// Serialises the headers, one folded field per CRLF-terminated line.
    #[must_use]
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

/// Removes folding: each CRLF that precedes whitespace is deleted.
#[must_use]
pub fn unfold(raw: &str) -> String {
    raw.replace("\r\n", "")
}

/// One header field as read from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    /// Lower-cased field name.
    pub name: String,
    /// Value after the colon, folds kept as CRLF + whitespace.
    pub raw_value: String,
}

/// Tokenises header fields from a byte source.
///
/// The reader stops after the blank line that ends the header block, or at
/// end of stream. A byte read ahead while checking for a fold stays in the
/// shared [`Pushback`], so the body starts exactly after the header block.
pub struct HeaderReader<'a, S> {
    source: &'a mut Pushback<S>,
    options: &'a DecodeOptions,
    line_length: usize,
    done: bool,
}

impl<'a, S: ByteSource> HeaderReader<'a, S> {
    /// Creates a reader over the given source.
    pub const fn new(source: &'a mut Pushback<S>, options: &'a DecodeOptions) -> Self {
        Self {
            source,
            options,
            line_length: 0,
            done: false,
        }
    }

    fn count(&mut self) -> Result<()> {
        self.line_length += 1;
        match self.options.max_header_line_length {
            Some(limit) if self.line_length > limit => Err(Error::LineTooLong { limit }),
            _ => Ok(()),
        }
    }

    /// Consumes the rest of a line break after `first` (CR or LF).
    fn line_break(&mut self, first: u8) -> Result<()> {
        if first == b'\r' {
            let next = self.source.next_byte()?;
            if next == Some(b'\n') {
                return Ok(());
            }
            if self.options.lenient_line_breaks {
                self.source.unget_opt(next);
                return Ok(());
            }
            return Err(Error::structural("CR not followed by LF in header"));
        }
        if self.options.lenient_line_breaks {
            Ok(())
        } else {
            Err(Error::structural("bare LF in header"))
        }
    }

    /// Reads the next field, or `None` at the end of the header block.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or malformed name, whitespace inside a
    /// name, forbidden bytes in a structured value, or an overlong line.
    pub fn next_field(&mut self) -> Result<Option<HeaderField>> {
        if self.done {
            return Ok(None);
        }
        self.line_length = 0;
        let first = match self.source.next_byte()? {
            None => {
                self.done = true;
                return Ok(None);
            }
            Some(b @ (b'\r' | b'\n')) => {
                self.line_break(b)?;
                self.done = true;
                return Ok(None);
            }
            Some(b) => b,
        };
        self.source.unget(first);
        let name = self.read_name()?;
        let raw_value = self.read_value(is_unstructured(&name))?;
        Ok(Some(HeaderField { name, raw_value }))
    }

    fn read_name(&mut self) -> Result<String> {
        let mut name = String::new();
        loop {
            let Some(c) = self.source.next_byte()? else {
                return Err(Error::structural("end of stream inside header field name"));
            };
            self.count()?;
            match c {
                b':' => break,
                b' ' | b'\t' => {
                    // Whitespace may separate the name from the colon but not split it.
                    loop {
                        match self.source.next_byte()? {
                            Some(b' ' | b'\t') => self.count()?,
                            Some(b':') => {
                                self.count()?;
                                break;
                            }
                            _ => {
                                return Err(Error::structural(format!(
                                    "whitespace inside header field name {name:?}"
                                )));
                            }
                        }
                    }
                    break;
                }
                b'!'..=b'~' => name.push(char::from(c.to_ascii_lowercase())),
                _ => {
                    return Err(Error::structural(format!(
                        "malformed header field name {name:?}"
                    )));
                }
            }
        }
        if name.is_empty() {
            return Err(Error::structural("empty header field name"));
        }
        Ok(name)
    }

    fn read_value(&mut self, unstructured: bool) -> Result<String> {
        let mut value = String::new();
        loop {
            let Some(c) = self.source.next_byte()? else {
                self.done = true;
                return Ok(value);
            };
            match c {
                b'\r' | b'\n' => {
                    self.line_break(c)?;
                    match self.source.next_byte()? {
                        Some(w @ (b' ' | b'\t')) => {
                            value.push_str("\r\n");
                            value.push(char::from(w));
                            self.line_length = 1;
                        }
                        next => {
                            self.source.unget_opt(next);
                            return Ok(value);
                        }
                    }
                }
                0x80..=0xff => {
                    self.count()?;
                    if !unstructured && !self.options.lenient_characters {
                        return Err(Error::InvalidCharacter {
                            byte: c,
                            context: "header value",
                        });
                    }
                    value.push(char::REPLACEMENT_CHARACTER);
                }
                0 if !self.options.lenient_characters => {
                    return Err(Error::InvalidCharacter {
                        byte: 0,
                        context: "header value",
                    });
                }
                _ => {
                    self.count()?;
                    value.push(char::from(c));
                }
            }
        }
    }
}

/// Reads a complete header block, storing unfolded, trimmed values.
///
/// # Errors
///
/// Propagates any error from [`HeaderReader::next_field`].
pub fn read_headers<S: ByteSource>(
    source: &mut Pushback<S>,
    options: &DecodeOptions,
) -> Result<Headers> {
    let mut headers = Headers::new();
    let mut reader = HeaderReader::new(source, options);
    while let Some(field) = reader.next_field()? {
        let value = unfold(&field.raw_value);
        headers.add(field.name, value.trim());
    }
    Ok(headers)
}

/// Formats a lower-cased field name in its conventional capitalisation.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    match name {
        "mime-version" => return "MIME-Version".to_string(),
        "message-id" => return "Message-ID".to_string(),
        "content-id" => return "Content-ID".to_string(),
        _ => {}
    }
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            let line = encode_header_field(&canonical_name(name), name, value);
            write!(f, "{line}\r\n")?;
        }
        Ok(())
    }
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
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
        assert_eq!(headers.iter().next(), Some(("content-type", "text/plain")));
    }

    #[test]
    fn test_headers_set() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("Subject", "Hi");
        headers.add("To", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);

        headers.set("To", "charlie@example.com");
        assert_eq!(headers.get_all("To"), vec!["charlie@example.com"]);
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["to", "subject"]);
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        assert!(headers.get("Subject").is_some());

        headers.remove("Subject");
        assert!(headers.get("Subject").is_none());
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n"
        );

        let headers = Headers::parse(text.as_bytes()).unwrap();
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["from", "to", "subject", "content-type"]);
    }

    #[test]
    fn test_reader_keeps_folds_in_raw_value() {
        let mut source = Pushback::new(SliceSource::new(b"X-A: one\r\n\ttwo\r\n\r\nbody"));
        let options = DecodeOptions::default();
        let mut reader = HeaderReader::new(&mut source, &options);
        let field = reader.next_field().unwrap().unwrap();
        assert_eq!(field.name, "x-a");
        assert_eq!(field.raw_value, " one\r\n\ttwo");
        assert!(reader.next_field().unwrap().is_none());
        assert_eq!(source.read_to_vec().unwrap(), b"body");
    }

    #[test]
    fn test_whitespace_before_colon() {
        let headers = Headers::parse(b"Subject \t: spaced\r\n\r\n").unwrap();
        assert_eq!(headers.get("subject"), Some("spaced"));
    }

    #[test]
    fn test_malformed_names() {
        assert!(matches!(
            Headers::parse(b"Sub ject: x\r\n\r\n"),
            Err(Error::Structural(_))
        ));
        assert!(matches!(
            Headers::parse(b": x\r\n\r\n"),
            Err(Error::Structural(_))
        ));
        assert!(matches!(
            Headers::parse(b"no colon here\r\n\r\n"),
            Err(Error::Structural(_))
        ));
        assert!(Headers::parse(b"Bad\x01Name: x\r\n\r\n").is_err());
    }

    #[test]
    fn test_non_ascii_values() {
        let headers = Headers::parse(b"Subject: caf\xe9\r\n\r\n").unwrap();
        assert_eq!(headers.get("subject"), Some("caf\u{FFFD}"));
        assert!(matches!(
            Headers::parse(b"To: caf\xe9@example.com\r\n\r\n"),
            Err(Error::InvalidCharacter { byte: 0xe9, .. })
        ));
    }

    #[test]
    fn test_line_length_limit() {
        let mut raw = b"X-Long: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 990));
        assert!(Headers::parse(&raw).is_ok());
        raw.push(b'a');
        assert!(matches!(
            Headers::parse(&raw),
            Err(Error::LineTooLong { limit: 998 })
        ));

        // Each continuation line has its own budget.
        let mut folded = b"X-Long: ".to_vec();
        folded.extend(std::iter::repeat_n(b'a', 900));
        folded.extend_from_slice(b"\r\n ");
        folded.extend(std::iter::repeat_n(b'b', 900));
        assert!(Headers::parse(&folded).is_ok());
    }

    #[test]
    fn test_bare_lf_needs_lenient() {
        assert!(Headers::parse(b"A: b\nC: d\n\n").is_err());
        let mut source = Pushback::new(SliceSource::new(b"A: b\nC: d\n\nrest"));
        let headers = read_headers(&mut source, &DecodeOptions::lenient()).unwrap();
        assert_eq!(headers.get("c"), Some("d"));
        assert_eq!(source.read_to_vec().unwrap(), b"rest");
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("content-type"), "Content-Type");
        assert_eq!(canonical_name("mime-version"), "MIME-Version");
        assert_eq!(canonical_name("x-mailer"), "X-Mailer");
    }

    #[test]
    fn test_headers_display() {
        let mut headers = Headers::new();
        headers.add("from", "sender@example.com");
        headers.add("to", "recipient@example.com");

        let s = headers.to_string();
        assert_eq!(s, "From: sender@example.com\r\nTo: recipient@example.com\r\n");
    }
}
