//! Decoder configuration.

/// RFC 5322 hard limit on a header line, excluding CRLF.
pub const MAX_HEADER_LINE_LENGTH: usize = 998;

/// RFC 2045 limit on an encoded body line, excluding CRLF.
pub const MAX_ENCODED_LINE_LENGTH: usize = 76;

/// Limits and leniency switches for a decode.
///
/// The default is strict: every RFC limit is enforced and malformed input
/// fails the decode. Use [`DecodeOptions::lenient`] for legacy mail.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodeOptions {
    /// Maximum header line length; `None` disables the check.
    pub max_header_line_length: Option<usize>,
    /// Maximum quoted-printable line length; `None` disables the check.
    pub max_quoted_printable_line_length: Option<usize>,
    /// Maximum base64 line length; `None` disables the check.
    pub max_base64_line_length: Option<usize>,
    /// Accept bare CR or LF as line breaks and normalise them to CRLF.
    pub lenient_line_breaks: bool,
    /// Substitute undecodable bytes and escapes instead of failing.
    pub lenient_characters: bool,
    /// End a multipart at end of stream when its closing delimiter is missing.
    pub allow_unterminated_multipart: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_header_line_length: Some(MAX_HEADER_LINE_LENGTH),
            max_quoted_printable_line_length: Some(MAX_ENCODED_LINE_LENGTH),
            max_base64_line_length: Some(MAX_ENCODED_LINE_LENGTH),
            lenient_line_breaks: false,
            lenient_characters: false,
            allow_unterminated_multipart: false,
        }
    }
}

impl DecodeOptions {
    /// Creates strict options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for real-world mail: bare line breaks, stray bytes and
    /// unterminated multiparts are tolerated, and body line limits are off.
    #[must_use]
    pub const fn lenient() -> Self {
        Self {
            max_header_line_length: Some(MAX_HEADER_LINE_LENGTH),
            max_quoted_printable_line_length: None,
            max_base64_line_length: None,
            lenient_line_breaks: true,
            lenient_characters: true,
            allow_unterminated_multipart: true,
        }
    }

    /// Creates an options builder starting from the strict defaults.
    #[must_use]
    pub fn builder() -> DecodeOptionsBuilder {
        DecodeOptionsBuilder::new()
    }
}

/// Builder for [`DecodeOptions`].
#[derive(Debug, Clone, Default)]
pub struct DecodeOptionsBuilder {
    options: DecodeOptions,
}

impl DecodeOptionsBuilder {
    /// Creates a new builder with strict defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the header line limit.
    #[must_use]
    pub const fn max_header_line_length(mut self, limit: Option<usize>) -> Self {
        self.options.max_header_line_length = limit;
        self
    }

    /// Sets the quoted-printable line limit.
    #[must_use]
    pub const fn max_quoted_printable_line_length(mut self, limit: Option<usize>) -> Self {
        self.options.max_quoted_printable_line_length = limit;
        self
    }

    /// Sets the base64 line limit.
    #[must_use]
    pub const fn max_base64_line_length(mut self, limit: Option<usize>) -> Self {
        self.options.max_base64_line_length = limit;
        self
    }

    /// Accepts bare CR/LF line breaks.
    #[must_use]
    pub const fn lenient_line_breaks(mut self, lenient: bool) -> Self {
        self.options.lenient_line_breaks = lenient;
        self
    }

    /// Substitutes bad bytes and escapes instead of failing.
    #[must_use]
    pub const fn lenient_characters(mut self, lenient: bool) -> Self {
        self.options.lenient_characters = lenient;
        self
    }

    /// Tolerates a multipart that ends without its closing delimiter.
    #[must_use]
    pub const fn allow_unterminated_multipart(mut self, allow: bool) -> Self {
        self.options.allow_unterminated_multipart = allow;
        self
    }

    /// Builds the options.
    #[must_use]
    pub fn build(self) -> DecodeOptions {
        self.options
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_strict() {
        let options = DecodeOptions::default();
        assert_eq!(options.max_header_line_length, Some(998));
        assert_eq!(options.max_quoted_printable_line_length, Some(76));
        assert!(!options.lenient_line_breaks);
        assert!(!options.lenient_characters);
    }

    #[test]
    fn test_builder() {
        let options = DecodeOptions::builder()
            .max_quoted_printable_line_length(None)
            .lenient_line_breaks(true)
            .build();
        assert_eq!(options.max_quoted_printable_line_length, None);
        assert!(options.lenient_line_breaks);
        assert!(!options.lenient_characters);
        assert_eq!(options.max_base64_line_length, Some(76));
    }

    #[test]
    fn test_lenient_preset() {
        let options = DecodeOptions::lenient();
        assert!(options.allow_unterminated_multipart);
        assert_eq!(options.max_base64_line_length, None);
    }
}
