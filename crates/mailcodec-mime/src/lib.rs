//! # mailcodec-mime
//!
//! Streaming MIME decoding and header encoding for email.
//!
//! ## Features
//!
//! - **Pull-based decoding**: every decoder is a [`ByteSource`] wrapping another
//! - **Transfer encodings**: 7bit, 8bit, binary, quoted-printable and base64
//! - **Multipart**: nested bodies split by one shared [`BoundaryChecker`]
//! - **Header words**: RFC 2047 encoded words and RFC 2231 parameters
//! - **Generation**: encoded words, folding and transfer-encoding selection
//!
//! ## Quick Start
//!
//! ### Parsing MIME Messages
//!
//! ```
//! use mailcodec_mime::{DecodeOptions, Message};
//!
//! let raw = concat!(
//!     "Subject: =?utf-8?q?Gr=C3=BC=C3=9Fe?=\r\n",
//!     "Content-Type: multipart/mixed; boundary=myboundary\r\n",
//!     "\r\n",
//!     "--myboundary\r\n",
//!     "Content-Transfer-Encoding: quoted-printable\r\n",
//!     "\r\n",
//!     "caf=C3=A9\r\n",
//!     "--myboundary--\r\n",
//! );
//!
//! let message = Message::parse_with(raw.as_bytes(), &DecodeOptions::default())?;
//! assert_eq!(message.subject().as_deref(), Some("Grüße"));
//! assert_eq!(message.parts()[0].body(), Some("café".as_bytes()));
//! # Ok::<(), mailcodec_mime::Error>(())
//! ```
//!
//! ### Lenient Decoding
//!
//! ```
//! use mailcodec_mime::{DecodeOptions, Message};
//!
//! let options = DecodeOptions::builder()
//!     .lenient_line_breaks(true)
//!     .allow_unterminated_multipart(true)
//!     .build();
//! let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\n\nunterminated";
//! let message = Message::parse_with(raw, &options)?;
//! assert_eq!(message.parts().len(), 1);
//! # Ok::<(), mailcodec_mime::Error>(())
//! ```
//!
//! ### Encoding Headers
//!
//! ```
//! use mailcodec_mime::encoder::{EncodedWordEncoder, encode_header_field};
//!
//! let mut encoder = EncodedWordEncoder::new();
//! encoder.push_str("Héllo");
//! assert_eq!(encoder.finish(), "=?utf-8?q?H=C3=A9llo?=");
//!
//! let line = encode_header_field("Subject", "subject", "Héllo world");
//! assert_eq!(line, "Subject: =?utf-8?q?H=C3=A9llo?= world");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod boundary;
mod config;
mod content_type;
mod error;
mod header;
mod message;
mod parser;
mod source;

pub mod encoder;
pub mod transform;
pub mod words;

pub use boundary::{BoundaryChecker, Delimiter, MAX_BOUNDARY_LENGTH, State, validate_boundary};
pub use config::{DecodeOptions, DecodeOptionsBuilder, MAX_ENCODED_LINE_LENGTH, MAX_HEADER_LINE_LENGTH};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::{HeaderField, HeaderReader, Headers, canonical_name, is_unstructured, read_headers, unfold};
pub use message::{Message, TransferEncoding};
pub use parser::MAX_NESTING_DEPTH;
pub use source::{ByteSource, Pushback, ReaderSource, SliceSource};
