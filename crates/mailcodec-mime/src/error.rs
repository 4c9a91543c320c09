//! Error types for MIME decoding and encoding.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
///
/// Every variant is fatal to the decode that produced it. Transforms never
/// retry; the error unwinds through every wrapping decoder to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad hex digits after `=`, or an invalid Q/percent escape.
    #[error("Malformed escape: {0}")]
    MalformedEscape(String),

    /// A quoted-printable, base64 or header line exceeded its limit.
    #[error("Line too long: exceeds {limit} bytes")]
    LineTooLong {
        /// The limit that was exceeded.
        limit: usize,
    },

    /// A byte that the active encoding does not permit.
    #[error("Invalid character {byte:#04x} in {context}")]
    InvalidCharacter {
        /// The offending byte.
        byte: u8,
        /// Where the byte was found (e.g. "7bit body").
        context: &'static str,
    },

    /// Missing or invalid boundary, incompatible transfer encoding,
    /// premature end of stream, or a malformed header field.
    #[error("Structural error: {0}")]
    Structural(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Base64 stream ended with a single leftover character.
    #[error("Base64 stream ends with an incomplete group")]
    IncompleteGroup,

    /// B-encoded word decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// I/O error from a reader-backed byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    pub(crate) fn escape(message: impl Into<String>) -> Self {
        Self::MalformedEscape(message.into())
    }
}
