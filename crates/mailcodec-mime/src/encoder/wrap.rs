//! Header folding.

/// Preferred maximum line length for folded header lines.
pub const MAX_LINE_LENGTH: usize = 76;

/// Folds whitespace-separated words into header lines of at most 76
/// octets.
///
/// Runs of whitespace collapse to a single space. Folds (`CRLF SP`) are
/// only inserted before a word, so a single word longer than the limit is
/// kept whole on its own line.
#[derive(Debug)]
pub struct WordWrapEncoder {
    output: String,
    line_length: usize,
}

const fn is_wsp(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

impl WordWrapEncoder {
    /// Creates an encoder whose first line already holds `start_column`
    /// characters (typically the field name and colon).
    #[must_use]
    pub const fn new(start_column: usize) -> Self {
        Self {
            output: String::new(),
            line_length: start_column,
        }
    }

    /// Appends text; every whitespace-separated token is one word.
    pub fn push_str(&mut self, text: &str) {
        for word in text.split(is_wsp).filter(|w| !w.is_empty()) {
            self.push_word(word);
        }
    }

    /// Appends a structured field value. Quoted strings are never split,
    /// and the whitespace inside them is kept as written.
    pub fn push_structured(&mut self, text: &str) {
        let mut start = None;
        let mut in_quotes = false;
        let mut escaped = false;
        for (i, c) in text.char_indices() {
            if in_quotes {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_quotes = false,
                    _ => {}
                }
                continue;
            }
            if is_wsp(c) {
                if let Some(s) = start.take() {
                    self.push_word(&text[s..i]);
                }
                continue;
            }
            in_quotes = c == '"';
            start.get_or_insert(i);
        }
        if let Some(s) = start {
            self.push_word(&text[s..]);
        }
    }

    /// Appends a single word, folding first if it would overflow the line.
    pub fn push_word(&mut self, word: &str) {
        let width = word.len();
        if self.line_length > 0 && self.line_length + 1 + width > MAX_LINE_LENGTH {
            self.output.push_str("\r\n ");
            self.line_length = 1 + width;
        } else {
            self.output.push(' ');
            self.line_length += 1 + width;
        }
        self.output.push_str(word);
    }

    /// Returns the folded text, starting with the space after the colon.
    #[must_use]
    pub fn finish(self) -> String {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_value_untouched() {
        let mut wrap = WordWrapEncoder::new("Subject:".len());
        wrap.push_str("hello   world");
        assert_eq!(wrap.finish(), " hello world");
    }

    #[test]
    fn test_folds_at_76() {
        let mut wrap = WordWrapEncoder::new("Subject:".len());
        wrap.push_str(&"word ".repeat(30));
        let folded = format!("Subject:{}", wrap.finish());
        for line in folded.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH, "{line:?}");
        }
        assert!(folded.contains("\r\n word"));
        assert_eq!(folded.replace("\r\n", ""), format!("Subject:{}", " word".repeat(30)));
    }

    #[test]
    fn test_long_word_kept_whole() {
        let long = "x".repeat(100);
        let mut wrap = WordWrapEncoder::new(3);
        wrap.push_word(&long);
        wrap.push_word("y");
        assert_eq!(wrap.finish(), format!("\r\n {long}\r\n y"));
    }

    #[test]
    fn test_quoted_string_kept_whole() {
        let mut wrap = WordWrapEncoder::new("Content-Type:".len());
        wrap.push_structured("multipart/mixed;   boundary=\"a  b\" (x  y)");
        assert_eq!(wrap.finish(), " multipart/mixed; boundary=\"a  b\" (x y)");

        let mut wrap = WordWrapEncoder::new(3);
        wrap.push_structured(r#""say \"hi  there\"" <a@example.com>"#);
        assert_eq!(wrap.finish(), r#" "say \"hi  there\"" <a@example.com>"#);
    }

    #[test]
    fn test_width_counts_octets() {
        let word = "é".repeat(20);
        let mut wrap = WordWrapEncoder::new(40);
        wrap.push_word(&word);
        assert_eq!(wrap.finish(), format!("\r\n {word}"));
    }

    #[test]
    fn test_fold_before_first_word() {
        let mut wrap = WordWrapEncoder::new(74);
        wrap.push_word("abcdef");
        assert_eq!(wrap.finish(), "\r\n abcdef");

        let mut wrap = WordWrapEncoder::new(0);
        wrap.push_word(&"z".repeat(80));
        assert!(!wrap.finish().starts_with("\r\n"));
    }
}
