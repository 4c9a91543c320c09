//! Pull-based byte sources.
//!
//! Every decoder in this crate reads through [`ByteSource`] rather than a
//! concrete stream type, so transforms stack freely on top of each other.

use std::io::Read;

use crate::error::Result;

/// A source of bytes pulled one at a time.
pub trait ByteSource {
    /// Returns the next byte, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying stream or decoder fails.
    fn next_byte(&mut self) -> Result<Option<u8>>;

    /// Drains the source into a vector.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the source.
    fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(b) = self.next_byte()? {
            out.push(b);
        }
        Ok(out)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        (**self).next_byte()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        (**self).next_byte()
    }
}

/// Byte source over an in-memory slice.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Creates a source over the given bytes.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the unread input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }
}

impl ByteSource for SliceSource<'_> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.input.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }
}

/// Byte source over any [`Read`] implementation.
///
/// Reads in chunks; wrap slow readers in [`std::io::BufReader`] only if they
/// are expensive per call, since this type already buffers.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    eof: bool,
}

impl<R: Read> ReaderSource<R> {
    const CHUNK: usize = 8192;

    /// Creates a source over the given reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; Self::CHUNK].into_boxed_slice(),
            pos: 0,
            len: 0,
            eof: false,
        }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        while self.pos == self.len {
            if self.eof {
                return Ok(None);
            }
            match self.reader.read(&mut self.buf) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    self.pos = 0;
                    self.len = n;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(byte))
    }
}

/// One-byte pushback decorator.
///
/// `next_byte` drains the pushed-back slot before pulling upstream.
#[derive(Debug)]
pub struct Pushback<S> {
    inner: S,
    pending: Option<u8>,
}

impl<S: ByteSource> Pushback<S> {
    /// Wraps a source.
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            pending: None,
        }
    }

    /// Pushes a byte back so the next read returns it.
    ///
    /// Only one byte may be pending at a time.
    pub fn unget(&mut self, byte: u8) {
        debug_assert!(self.pending.is_none(), "pushback slot already occupied");
        self.pending = Some(byte);
    }

    /// Pushes back an optional byte; `None` (end of stream) is a no-op.
    pub fn unget_opt(&mut self, byte: Option<u8>) {
        if let Some(b) = byte {
            self.unget(b);
        }
    }

    /// Returns true if a byte is waiting in the pushback slot.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Removes and returns the pending byte, if any.
    pub const fn take_pending(&mut self) -> Option<u8> {
        self.pending.take()
    }

    /// Returns the wrapped source, discarding any pending byte.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ByteSource> ByteSource for Pushback<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.pending.take() {
            return Ok(Some(b));
        }
        self.inner.next_byte()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_source() {
        let mut src = SliceSource::new(b"ab");
        assert_eq!(src.next_byte().unwrap(), Some(b'a'));
        assert_eq!(src.position(), 1);
        assert_eq!(src.remaining(), b"b");
        assert_eq!(src.next_byte().unwrap(), Some(b'b'));
        assert_eq!(src.next_byte().unwrap(), None);
        assert_eq!(src.next_byte().unwrap(), None);
    }

    #[test]
    fn test_reader_source() {
        let data = vec![b'x'; 20_000];
        let mut src = ReaderSource::new(std::io::Cursor::new(data.clone()));
        assert_eq!(src.read_to_vec().unwrap(), data);
        assert_eq!(src.next_byte().unwrap(), None);
    }

    #[test]
    fn test_pushback() {
        let mut src = Pushback::new(SliceSource::new(b"xy"));
        let b = src.next_byte().unwrap().unwrap();
        src.unget(b);
        assert!(src.has_pending());
        assert_eq!(src.read_to_vec().unwrap(), b"xy");
    }

    #[test]
    fn test_unget_none_is_noop() {
        let mut src = Pushback::new(SliceSource::new(b""));
        src.unget_opt(None);
        assert!(!src.has_pending());
        assert_eq!(src.next_byte().unwrap(), None);
    }
}
