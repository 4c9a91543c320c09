//! Streaming base64 decoder (RFC 2045 §6.8).

use crate::config::DecodeOptions;
use crate::error::{Error, Result};
use crate::source::{ByteSource, Pushback};

const INVALID: u8 = 0xff;

/// Standard alphabet decode table; `INVALID` marks non-alphabet bytes.
const DECODE_TABLE: [u8; 128] = {
    let alphabet = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < alphabet.len() {
        table[alphabet[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Base64 decoding transform.
///
/// Padding is not required: the tail of the stream is inferred from the
/// number of leftover alphabet characters. Bytes outside the alphabet are
/// skipped; 8-bit ones still count toward the line limit.
#[derive(Debug)]
pub struct Base64Decoder<S> {
    source: Pushback<S>,
    max_line_length: Option<usize>,
    lenient: bool,
    line_length: usize,
    accumulator: u32,
    buffered: u8,
    out: [u8; 3],
    out_pos: usize,
    out_len: usize,
}

impl<S: ByteSource> Base64Decoder<S> {
    /// Creates a decoder using the base64 settings in `options`.
    pub fn new(source: S, options: &DecodeOptions) -> Self {
        Self {
            source: Pushback::new(source),
            max_line_length: options.max_base64_line_length,
            lenient: options.lenient_characters,
            line_length: 0,
            accumulator: 0,
            buffered: 0,
            out: [0; 3],
            out_pos: 0,
            out_len: 0,
        }
    }

    fn count(&mut self) -> Result<()> {
        self.line_length += 1;
        match self.max_line_length {
            Some(limit) if self.line_length > limit => Err(Error::LineTooLong { limit }),
            _ => Ok(()),
        }
    }

    fn emit(&mut self, bytes: &[u8]) -> Option<u8> {
        self.out[..bytes.len()].copy_from_slice(bytes);
        self.out_pos = 1;
        self.out_len = bytes.len();
        bytes.first().copied()
    }

    /// Flushes a partial group of 2 or 3 characters.
    #[allow(clippy::cast_possible_truncation)]
    fn flush_partial(&mut self) -> Result<Option<u8>> {
        let acc = self.accumulator;
        let buffered = self.buffered;
        self.accumulator = 0;
        self.buffered = 0;
        match buffered {
            0 => Ok(None),
            1 if self.lenient => {
                tracing::warn!("dropping incomplete base64 group");
                Ok(None)
            }
            1 => Err(Error::IncompleteGroup),
            2 => Ok(self.emit(&[(acc >> 4) as u8])),
            _ => Ok(self.emit(&[(acc >> 10) as u8, (acc >> 2) as u8])),
        }
    }
}

impl<S: ByteSource> ByteSource for Base64Decoder<S> {
    #[allow(clippy::cast_possible_truncation)]
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.out_pos < self.out_len {
            let b = self.out[self.out_pos];
            self.out_pos += 1;
            return Ok(Some(b));
        }
        loop {
            let Some(c) = self.source.next_byte()? else {
                return self.flush_partial();
            };
            match c {
                b'\r' => {
                    let next = self.source.next_byte()?;
                    if next != Some(b'\n') {
                        self.source.unget_opt(next);
                    }
                    self.line_length = 0;
                }
                b'\n' => self.line_length = 0,
                b'=' => {
                    // Padding closes the group; concatenated encodings continue after it.
                    if let Some(b) = self.flush_partial()? {
                        return Ok(Some(b));
                    }
                }
                c if c >= 0x80 => self.count()?,
                c => {
                    let value = DECODE_TABLE[usize::from(c)];
                    if value == INVALID {
                        continue;
                    }
                    self.count()?;
                    self.accumulator = (self.accumulator << 6) | u32::from(value);
                    self.buffered += 1;
                    if self.buffered == 4 {
                        let acc = self.accumulator;
                        self.accumulator = 0;
                        self.buffered = 0;
                        return Ok(self.emit(&[(acc >> 16) as u8, (acc >> 8) as u8, acc as u8]));
                    }
                }
            }
        }
    }
}
