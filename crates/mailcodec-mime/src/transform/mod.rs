//! Body transforms: pull-based decoders stacked over a [`ByteSource`].
//!
//! Each transform owns only the state it needs. [`Transform`] selects one
//! from a part's [`TransferEncoding`].

mod base64;
mod quoted_printable;
mod validate;

pub use self::base64::Base64Decoder;
pub use quoted_printable::QuotedPrintableDecoder;
pub use validate::{Binary, EightBit, LiberalSevenBit, SevenBit};

pub(crate) use quoted_printable::hex_value;

use crate::config::DecodeOptions;
use crate::error::Result;
use crate::message::TransferEncoding;
use crate::source::{ByteSource, SliceSource};

/// A body decoder chosen for one message part.
#[derive(Debug)]
pub enum Transform<S> {
    /// Strict 7-bit validation.
    SevenBit(SevenBit<S>),
    /// 7-bit with invalid bytes replaced.
    LiberalSevenBit(LiberalSevenBit<S>),
    /// 8-bit validation.
    EightBit(EightBit<S>),
    /// No validation.
    Binary(Binary<S>),
    /// Quoted-printable decoding.
    QuotedPrintable(QuotedPrintableDecoder<S>),
    /// Base64 decoding.
    Base64(Base64Decoder<S>),
}

impl<S: ByteSource> Transform<S> {
    /// Builds the decoder for a transfer encoding.
    ///
    /// Unknown encodings pass bytes through unchanged. With
    /// `lenient_characters`, 7bit bodies use the liberal validator.
    pub fn for_encoding(encoding: TransferEncoding, source: S, options: &DecodeOptions) -> Self {
        match encoding {
            TransferEncoding::SevenBit if options.lenient_characters => {
                Self::LiberalSevenBit(LiberalSevenBit::new(source))
            }
            TransferEncoding::SevenBit => Self::SevenBit(SevenBit::new(source)),
            TransferEncoding::EightBit => Self::EightBit(EightBit::new(source)),
            TransferEncoding::Binary | TransferEncoding::Unknown => {
                Self::Binary(Binary::new(source))
            }
            TransferEncoding::QuotedPrintable => {
                Self::QuotedPrintable(QuotedPrintableDecoder::new(source, options))
            }
            TransferEncoding::Base64 => Self::Base64(Base64Decoder::new(source, options)),
        }
    }
}

impl<S: ByteSource> ByteSource for Transform<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        match self {
            Self::SevenBit(t) => t.next_byte(),
            Self::LiberalSevenBit(t) => t.next_byte(),
            Self::EightBit(t) => t.next_byte(),
            Self::Binary(t) => t.next_byte(),
            Self::QuotedPrintable(t) => t.next_byte(),
            Self::Base64(t) => t.next_byte(),
        }
    }
}

/// Decodes a complete in-memory body.
///
/// # Errors
///
/// Returns the first error raised by the selected transform.
pub fn decode_body(
    encoding: TransferEncoding,
    body: &[u8],
    options: &DecodeOptions,
) -> Result<Vec<u8>> {
    Transform::for_encoding(encoding, SliceSource::new(body), options).read_to_vec()
}
