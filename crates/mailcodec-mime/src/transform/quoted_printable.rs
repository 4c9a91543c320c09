//! Streaming quoted-printable decoder (RFC 2045 §6.7).

use std::collections::VecDeque;

use crate::config::DecodeOptions;
use crate::error::{Error, Result};
use crate::source::{ByteSource, Pushback};

/// Returns the value of an ASCII hex digit. Lowercase is accepted.
pub(crate) const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Outcome of the bytes following `=`.
enum Escape {
    Byte(u8),
    SoftBreak,
    // A bare `=` at end of stream ends the data silently.
    End,
}

/// Quoted-printable decoding transform.
///
/// Hard line breaks come out as CRLF. Trailing whitespace before a line
/// break or end of stream is deleted (rule 3); an encoded `=20` survives.
#[derive(Debug)]
pub struct QuotedPrintableDecoder<S> {
    source: Pushback<S>,
    max_line_length: Option<usize>,
    lenient_line_breaks: bool,
    lenient_characters: bool,
    line_length: usize,
    // Pending output: the LF of a hard break, or a whitespace run being held
    // until we know whether a line break follows it.
    output: VecDeque<u8>,
}

impl<S: ByteSource> QuotedPrintableDecoder<S> {
    /// Creates a decoder using the quoted-printable settings in `options`.
    pub fn new(source: S, options: &DecodeOptions) -> Self {
        Self {
            source: Pushback::new(source),
            max_line_length: options.max_quoted_printable_line_length,
            lenient_line_breaks: options.lenient_line_breaks,
            lenient_characters: options.lenient_characters,
            line_length: 0,
            output: VecDeque::new(),
        }
    }

    fn count(&mut self, n: usize) -> Result<()> {
        self.line_length += n;
        match self.max_line_length {
            Some(limit) if self.line_length > limit => Err(Error::LineTooLong { limit }),
            _ => Ok(()),
        }
    }

    fn hard_break(&mut self) -> u8 {
        self.line_length = 0;
        self.output.push_back(b'\n');
        b'\r'
    }

    /// Consumes the LF after a CR.
    fn expect_lf(&mut self) -> Result<()> {
        let next = self.source.next_byte()?;
        if next == Some(b'\n') {
            return Ok(());
        }
        if !self.lenient_line_breaks {
            return Err(Error::structural(
                "CR not followed by LF in quoted-printable body",
            ));
        }
        self.source.unget_opt(next);
        Ok(())
    }

    fn bare_lf(&self) -> Result<()> {
        if self.lenient_line_breaks {
            Ok(())
        } else {
            Err(Error::structural("bare LF in quoted-printable body"))
        }
    }

    /// Handles the bytes after `=`.
    fn escape(&mut self) -> Result<Escape> {
        let Some(b1) = self.source.next_byte()? else {
            return Ok(Escape::End);
        };
        match b1 {
            b'\r' => {
                self.expect_lf()?;
                self.line_length = 0;
                return Ok(Escape::SoftBreak);
            }
            b'\n' => {
                self.bare_lf()?;
                self.line_length = 0;
                return Ok(Escape::SoftBreak);
            }
            _ => {}
        }
        let b2 = self.source.next_byte()?;
        if let (Some(hi), Some(lo)) = (hex_value(b1), b2.and_then(hex_value)) {
            self.count(2)?;
            return Ok(Escape::Byte((hi << 4) | lo));
        }
        if !self.lenient_characters {
            return Err(Error::escape(format!(
                "invalid quoted-printable escape ={}{}",
                char::from(b1).escape_default(),
                b2.map(|b| char::from(b).escape_default().to_string())
                    .unwrap_or_default()
            )));
        }
        tracing::warn!(byte = b1, "passing malformed quoted-printable escape through");
        self.source.unget_opt(b2);
        self.count(1)?;
        self.output.push_back(b1);
        Ok(Escape::Byte(b'='))
    }
}

impl<S: ByteSource> ByteSource for QuotedPrintableDecoder<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        loop {
            if let Some(b) = self.output.pop_front() {
                return Ok(Some(b));
            }
            let Some(c) = self.source.next_byte()? else {
                return Ok(None);
            };
            match c {
                b'\r' => {
                    self.expect_lf()?;
                    return Ok(Some(self.hard_break()));
                }
                b'\n' => {
                    self.bare_lf()?;
                    return Ok(Some(self.hard_break()));
                }
                b'=' => {
                    self.count(1)?;
                    match self.escape()? {
                        Escape::Byte(b) => return Ok(Some(b)),
                        Escape::SoftBreak => {}
                        Escape::End => return Ok(None),
                    }
                }
                b' ' | b'\t' => {
                    self.count(1)?;
                    self.output.push_back(c);
                    loop {
                        match self.source.next_byte()? {
                            Some(w @ (b' ' | b'\t')) => {
                                self.count(1)?;
                                self.output.push_back(w);
                            }
                            None => {
                                self.output.clear();
                                return Ok(None);
                            }
                            Some(b @ (b'\r' | b'\n')) => {
                                self.output.clear();
                                self.source.unget(b);
                                break;
                            }
                            Some(b) => {
                                self.source.unget(b);
                                break;
                            }
                        }
                    }
                }
                c if c < 0x20 || c >= 0x7f => {
                    if !self.lenient_characters {
                        return Err(Error::InvalidCharacter {
                            byte: c,
                            context: "quoted-printable body",
                        });
                    }
                    self.count(1)?;
                    return Ok(Some(c));
                }
                c => {
                    self.count(1)?;
                    return Ok(Some(c));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    fn decode(input: &[u8], options: &DecodeOptions) -> Result<Vec<u8>> {
        QuotedPrintableDecoder::new(SliceSource::new(input), options).read_to_vec()
    }

    fn strict(input: &[u8]) -> Result<Vec<u8>> {
        decode(input, &DecodeOptions::default())
    }

    #[test]
    fn test_escapes() {
        assert_eq!(strict(b"te=3Dst").unwrap(), b"te=st");
        assert_eq!(strict(b"H=C3=A9llo").unwrap(), b"H\xc3\xa9llo");
        assert_eq!(strict(b"h=c3=a9").unwrap(), b"h\xc3\xa9");
    }

    #[test]
    fn test_trailing_whitespace_deleted() {
        assert_eq!(strict(b"te ").unwrap(), b"te");
        assert_eq!(strict(b"te \r\n").unwrap(), b"te\r\n");
        assert_eq!(strict(b"te \t \r\nst").unwrap(), b"te\r\nst");
        assert_eq!(strict(b"te=20").unwrap(), b"te ");
        assert_eq!(strict(b"a b\tc").unwrap(), b"a b\tc");
    }

    #[test]
    fn test_soft_line_break() {
        assert_eq!(strict(b"Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(strict(b"Hello =\r\nWorld").unwrap(), b"Hello World");
    }

    #[test]
    fn test_trailing_equals_terminates() {
        assert_eq!(strict(b"abc=").unwrap(), b"abc");
    }

    #[test]
    fn test_hard_breaks() {
        let lenient = DecodeOptions::lenient();
        assert_eq!(decode(b"te\r\nst", &lenient).unwrap(), b"te\r\nst");
        assert_eq!(strict(b"te\r\nst").unwrap(), b"te\r\nst");
        assert_eq!(decode(b"a\nb\rc", &lenient).unwrap(), b"a\r\nb\r\nc");
        assert_eq!(decode(b"a=\nb", &lenient).unwrap(), b"ab");
        assert!(strict(b"a\nb").is_err());
        assert!(strict(b"a\rb").is_err());
    }

    #[test]
    fn test_malformed_escape() {
        assert!(matches!(strict(b"a=ZZ"), Err(Error::MalformedEscape(_))));
        assert!(matches!(strict(b"a=4"), Err(Error::MalformedEscape(_))));
        let lenient = DecodeOptions::lenient();
        assert_eq!(decode(b"a=ZZb", &lenient).unwrap(), b"a=ZZb");
    }

    #[test]
    fn test_line_length_limit() {
        let line = vec![b'x'; 77];
        assert!(matches!(strict(&line), Err(Error::LineTooLong { limit: 76 })));
        assert_eq!(strict(&line[..76]).unwrap(), &line[..76]);

        let mut soft = vec![b'x'; 75];
        soft.extend_from_slice(b"=\r\n");
        soft.extend_from_slice(&[b'y'; 75]);
        assert_eq!(strict(&soft).unwrap().len(), 150);

        let unlimited = DecodeOptions::builder()
            .max_quoted_printable_line_length(None)
            .build();
        assert_eq!(decode(&[b'z'; 500], &unlimited).unwrap().len(), 500);
    }

    #[test]
    fn test_control_characters() {
        assert!(matches!(
            strict(b"a\x01b"),
            Err(Error::InvalidCharacter { byte: 1, .. })
        ));
        assert!(strict(b"caf\xe9").is_err());
        assert_eq!(
            decode(b"a\x01b", &DecodeOptions::lenient()).unwrap(),
            b"a\x01b"
        );
    }
}
