//! RFC 2047 encoded-word generation (Q encoding, UTF-8).

use std::fmt::Write as _;

/// Opening of every word this encoder produces.
const PREFIX: &str = "=?utf-8?q?";
const SUFFIX: &str = "?=";

/// RFC 2047 §2 limit on one encoded word.
pub const MAX_ENCODED_WORD_LENGTH: usize = 75;

/// Printable ASCII that must still be escaped inside a word.
const RESERVED: &[u8] = b"?()<>[]:;@\\.=_\",";

/// Incremental encoded-word builder.
///
/// Characters are appended one at a time. When the current word would grow
/// past 75 characters it is closed and a new one opened; consecutive words
/// are separated by a single space, which decoders discard.
#[derive(Debug, Default)]
pub struct EncodedWordEncoder {
    word: String,
    output: String,
    space_pending: bool,
}

impl EncodedWordEncoder {
    /// Creates an encoder whose first word is not preceded by a space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder whose first word follows other text and so needs
    /// a separating space.
    #[must_use]
    pub fn after_text() -> Self {
        Self {
            space_pending: true,
            ..Self::default()
        }
    }

    /// Appends one character.
    pub fn push_char(&mut self, c: char) {
        match c {
            ' ' => self.append("_"),
            '!'..='~' if !RESERVED.contains(&(c as u8)) => {
                let mut buf = [0; 4];
                self.append(c.encode_utf8(&mut buf));
            }
            _ => {
                let mut buf = [0; 4];
                let mut piece = String::with_capacity(12);
                for b in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(piece, "={b:02X}");
                }
                self.append(&piece);
            }
        }
    }

    /// Appends every character of a string.
    pub fn push_str(&mut self, text: &str) {
        for c in text.chars() {
            self.push_char(c);
        }
    }

    /// Appends UTF-16 code units; surrogate pairs are combined and unpaired
    /// surrogates become U+FFFD.
    pub fn push_utf16(&mut self, units: &[u16]) {
        for c in char::decode_utf16(units.iter().copied()) {
            self.push_char(c.unwrap_or(char::REPLACEMENT_CHARACTER));
        }
    }

    // Escapes for one character are appended as a unit so no character is
    // split across words.
    fn append(&mut self, piece: &str) {
        if !self.word.is_empty()
            && PREFIX.len() + self.word.len() + piece.len() + SUFFIX.len() > MAX_ENCODED_WORD_LENGTH
        {
            self.end_word();
        }
        self.word.push_str(piece);
    }

    fn end_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        if self.space_pending {
            self.output.push(' ');
        }
        self.output.push_str(PREFIX);
        self.output.push_str(&self.word);
        self.output.push_str(SUFFIX);
        self.word.clear();
        self.space_pending = true;
    }

    /// Closes the current word and returns everything produced so far.
    ///
    /// The encoder stays usable; later words are preceded by a space.
    pub fn flush(&mut self) -> String {
        self.end_word();
        std::mem::take(&mut self.output)
    }

    /// Closes the current word and returns the complete output.
    #[must_use]
    pub fn finish(mut self) -> String {
        self.flush()
    }
}

fn needs_encoding(word: &str) -> bool {
    !word.is_ascii() || word.bytes().any(|b| b.is_ascii_control())
}

/// Encodes an unstructured header value.
///
/// Runs of words that contain non-ASCII text or control characters become
/// encoded words; other words, including existing encoded words, are kept
/// as written. Whitespace runs collapse to one space.
#[must_use]
pub fn encode_unstructured(value: &str) -> String {
    let words: Vec<&str> = value
        .split([' ', '\t', '\r', '\n'])
        .filter(|w| !w.is_empty())
        .collect();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;
    while i < words.len() {
        if !out.is_empty() {
            out.push(' ');
        }
        if needs_encoding(words[i]) {
            let start = i;
            while i < words.len() && needs_encoding(words[i]) {
                i += 1;
            }
            let mut encoder = EncodedWordEncoder::new();
            encoder.push_str(&words[start..i].join(" "));
            out.push_str(&encoder.finish());
        } else {
            out.push_str(words[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::words::decode_encoded_words;
    use proptest::prelude::*;

    #[test]
    fn test_simple_word() {
        let mut encoder = EncodedWordEncoder::new();
        encoder.push_str("Héllo world");
        assert_eq!(encoder.finish(), "=?utf-8?q?H=C3=A9llo_world?=");
    }

    #[test]
    fn test_reserved_characters_escaped() {
        let mut encoder = EncodedWordEncoder::new();
        encoder.push_str("a?b_c=d(e)");
        assert_eq!(encoder.finish(), "=?utf-8?q?a=3Fb=5Fc=3Dd=28e=29?=");
    }

    #[test]
    fn test_utf16_surrogates() {
        let units: Vec<u16> = "😀".encode_utf16().collect();
        let mut encoder = EncodedWordEncoder::new();
        encoder.push_utf16(&units);
        encoder.push_utf16(&[0xd800]);
        assert_eq!(
            encoder.finish(),
            "=?utf-8?q?=F0=9F=98=80=EF=BF=BD?="
        );
    }

    #[test]
    fn test_splits_at_75_columns() {
        let text = "é".repeat(40);
        let mut encoder = EncodedWordEncoder::new();
        encoder.push_str(&text);
        let out = encoder.finish();
        let words: Vec<&str> = out.split(' ').collect();
        assert!(words.len() > 1);
        for word in &words {
            assert!(word.len() <= MAX_ENCODED_WORD_LENGTH, "{word}");
            assert!(word.starts_with(PREFIX) && word.ends_with(SUFFIX));
        }
        assert_eq!(decode_encoded_words(&out), text);
    }

    #[test]
    fn test_flush_and_space_pending() {
        let mut encoder = EncodedWordEncoder::after_text();
        encoder.push_char('é');
        assert_eq!(encoder.flush(), " =?utf-8?q?=C3=A9?=");
        encoder.push_char('x');
        assert_eq!(encoder.flush(), " =?utf-8?q?x?=");
        assert_eq!(encoder.flush(), "");
    }

    #[test]
    fn test_encode_unstructured() {
        assert_eq!(encode_unstructured("plain  text"), "plain text");
        assert_eq!(
            encode_unstructured("Re: café au lait"),
            "Re: =?utf-8?q?caf=C3=A9?= au lait"
        );
        assert_eq!(
            encode_unstructured("über café"),
            "=?utf-8?q?=C3=BCber_caf=C3=A9?="
        );
        assert_eq!(decode_encoded_words(&encode_unstructured("Re: über café x")), "Re: über café x");
    }

    proptest! {
        #[test]
        fn encoded_words_decode_back(s in "\\PC{0,120}") {
            let mut encoder = EncodedWordEncoder::new();
            encoder.push_str(&s);
            let out = encoder.finish();
            for word in out.split(' ').filter(|w| !w.is_empty()) {
                prop_assert!(word.len() <= MAX_ENCODED_WORD_LENGTH);
            }
            prop_assert_eq!(decode_encoded_words(&out), s);
        }
    }
}
