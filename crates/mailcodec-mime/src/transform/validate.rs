//! Identity transforms that enforce a transfer encoding's byte range.

use crate::error::{Error, Result};
use crate::source::ByteSource;

/// Passes 7-bit data through; NUL and bytes >= 0x80 are rejected.
#[derive(Debug)]
pub struct SevenBit<S> {
    source: S,
}

impl<S: ByteSource> SevenBit<S> {
    /// Wraps a source.
    pub const fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: ByteSource> ByteSource for SevenBit<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        match self.source.next_byte()? {
            Some(b) if b == 0 || b >= 0x80 => Err(Error::InvalidCharacter {
                byte: b,
                context: "7bit body",
            }),
            other => Ok(other),
        }
    }
}

/// Passes 8-bit data through; only NUL is rejected.
#[derive(Debug)]
pub struct EightBit<S> {
    source: S,
}

impl<S: ByteSource> EightBit<S> {
    /// Wraps a source.
    pub const fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: ByteSource> ByteSource for EightBit<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        match self.source.next_byte()? {
            Some(0) => Err(Error::InvalidCharacter {
                byte: 0,
                context: "8bit body",
            }),
            other => Ok(other),
        }
    }
}

/// Passes every byte through unchanged.
#[derive(Debug)]
pub struct Binary<S> {
    source: S,
}

impl<S: ByteSource> Binary<S> {
    /// Wraps a source.
    pub const fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: ByteSource> ByteSource for Binary<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        self.source.next_byte()
    }
}

/// 7-bit transform that replaces invalid bytes with `?` instead of failing.
#[derive(Debug)]
pub struct LiberalSevenBit<S> {
    source: S,
}

impl<S: ByteSource> LiberalSevenBit<S> {
    /// Wraps a source.
    pub const fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: ByteSource> ByteSource for LiberalSevenBit<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        Ok(self
            .source
            .next_byte()?
            .map(|b| if b == 0 || b >= 0x80 { b'?' } else { b }))
    }
}
