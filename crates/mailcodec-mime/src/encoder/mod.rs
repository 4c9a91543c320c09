//! Encoders for the write side: header fields and transfer encodings.

mod comments;
mod encoded_word;
mod transfer;
mod wrap;

pub use comments::encode_comments;
pub use encoded_word::{EncodedWordEncoder, MAX_ENCODED_WORD_LENGTH, encode_unstructured};
pub use transfer::{
    encode_base64, encode_base64_lines, encode_quoted_printable, select_transfer_encoding,
};
pub use wrap::{MAX_LINE_LENGTH, WordWrapEncoder};

use crate::header::is_unstructured;

/// Encodes and folds one header field as `Name: value`, without the final
/// CRLF.
///
/// Unstructured fields get encoded words for their non-ASCII text;
/// structured fields only have their comments rewritten, and their quoted
/// strings are copied without folding.
#[must_use]
pub fn encode_header_field(display_name: &str, name: &str, value: &str) -> String {
    let mut wrap = WordWrapEncoder::new(display_name.len() + 1);
    if is_unstructured(name) {
        wrap.push_str(&encode_unstructured(value));
    } else {
        wrap.push_structured(&encode_comments(value));
    }
    format!("{display_name}:{}", wrap.finish())
}
