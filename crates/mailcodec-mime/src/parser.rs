//! Message assembly: headers, then either a decoded body or child parts.
//!
//! The whole message is read from one [`ByteSource`]. Multipart bodies run
//! through a single [`BoundaryChecker`] that is shared by every nesting
//! level; each level only consumes the delimiters that belong to it.

use tracing::{debug, trace, warn};

use crate::boundary::BoundaryChecker;
use crate::config::DecodeOptions;
use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::header::{Headers, read_headers};
use crate::message::{Message, TransferEncoding};
use crate::source::{ByteSource, Pushback};
use crate::transform::Transform;

/// Deepest multipart nesting accepted.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Parses a complete message from a byte source.
pub(crate) fn parse_message<S: ByteSource>(source: S, options: &DecodeOptions) -> Result<Message> {
    let mut source = Pushback::new(source);
    let headers = read_headers(&mut source, options)?;
    if headers.get("mime-version").is_none() {
        trace!("no MIME-Version header; applying MIME defaults anyway");
    }
    let (content_type, encoding) = resolve(&headers, false, options)?;

    if !content_type.is_multipart() {
        let body = Transform::for_encoding(encoding, &mut source, options).read_to_vec()?;
        debug!(content_type = %content_type.mime_type(), %encoding, len = body.len(), "single-part message");
        return Ok(Message::leaf(headers, content_type, encoding, body));
    }

    let boundary = boundary_of(&content_type)?;
    let mut checker =
        BoundaryChecker::new(&mut source).lenient_line_breaks(options.lenient_line_breaks);
    checker.push_boundary(boundary)?;
    let parts = read_multipart(&mut checker, 0, content_type.is_digest(), options)?;
    debug!(content_type = %content_type.mime_type(), parts = parts.len(), "multipart message");
    Ok(Message::composite(headers, content_type, encoding, parts))
}

/// Works out a part's effective content type and transfer encoding.
fn resolve(
    headers: &Headers,
    in_digest: bool,
    options: &DecodeOptions,
) -> Result<(ContentType, TransferEncoding)> {
    let default = if in_digest {
        ContentType::message_rfc822()
    } else {
        ContentType::default_text()
    };
    let mut content_type = match headers.get("content-type") {
        None => {
            debug!(content_type = %default.mime_type(), "no Content-Type; using default");
            default
        }
        Some(value) => match ContentType::parse_with(value, options.lenient_characters) {
            Ok(content_type) => content_type,
            Err(e @ Error::InvalidContentType(_)) => {
                warn!(error = %e, "unparseable Content-Type; using default");
                default
            }
            Err(e) => return Err(e),
        },
    };

    let mut encoding = headers
        .get("content-transfer-encoding")
        .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
    if encoding == TransferEncoding::Unknown {
        warn!(
            value = headers.get("content-transfer-encoding").unwrap_or_default(),
            "unknown transfer encoding; treating body as application/octet-stream"
        );
        content_type = ContentType::octet_stream();
    }

    if (content_type.is_multipart() || content_type.is_message()) && !encoding.is_identity() {
        if !options.lenient_characters {
            return Err(Error::structural(format!(
                "{encoding} transfer encoding is not allowed on {}",
                content_type.mime_type()
            )));
        }
        // A multipart body cannot be split once encoded; decode it as-is.
        if content_type.is_multipart() {
            warn!(%encoding, "ignoring transfer encoding on multipart");
            encoding = TransferEncoding::SevenBit;
        }
    }
    Ok((content_type, encoding))
}

fn boundary_of(content_type: &ContentType) -> Result<&str> {
    content_type.boundary().ok_or_else(|| {
        Error::structural(format!(
            "{} has no boundary parameter",
            content_type.mime_type()
        ))
    })
}

/// Discards bytes up to the next delimiter (preamble or epilogue).
fn skip<S: ByteSource>(checker: &mut BoundaryChecker<S>) -> Result<()> {
    let mut skipped = 0usize;
    while checker.next_byte()?.is_some() {
        skipped += 1;
    }
    if skipped > 0 {
        trace!(skipped, "discarded text outside body parts");
    }
    Ok(())
}

/// Reads the body parts of the multipart whose boundary sits at `level` on
/// the checker's stack.
fn read_multipart<S: ByteSource>(
    checker: &mut BoundaryChecker<S>,
    level: usize,
    digest: bool,
    options: &DecodeOptions,
) -> Result<Vec<Message>> {
    let mut parts = Vec::new();
    loop {
        skip(checker)?;
        let Some(delimiter) = checker.pending_delimiter() else {
            if options.allow_unterminated_multipart {
                warn!(level, parts = parts.len(), "multipart ended without closing delimiter");
                break;
            }
            return Err(Error::structural(
                "end of stream before closing multipart delimiter",
            ));
        };
        // A delimiter of an enclosing multipart ends this one too.
        if delimiter.depth < level {
            break;
        }
        checker.take_delimiter();
        if delimiter.closing {
            break;
        }
        parts.push(read_part(checker, digest, options)?);
    }

    if parts.is_empty() && !options.allow_unterminated_multipart {
        return Err(Error::structural("multipart has no body parts"));
    }
    Ok(parts)
}

/// Reads one body part that starts right after a delimiter line.
fn read_part<S: ByteSource>(
    checker: &mut BoundaryChecker<S>,
    in_digest: bool,
    options: &DecodeOptions,
) -> Result<Message> {
    checker.start_part_headers();
    let mut source = Pushback::new(&mut *checker);
    let headers = read_headers(&mut source, options)?;
    if let Some(byte) = source.take_pending() {
        checker.unread(byte);
    }
    checker.end_part_headers();

    let (content_type, encoding) = resolve(&headers, in_digest, options)?;
    if content_type.is_multipart() {
        if checker.depth() >= MAX_NESTING_DEPTH {
            return Err(Error::structural(format!(
                "multipart nesting deeper than {MAX_NESTING_DEPTH}"
            )));
        }
        checker.push_boundary(boundary_of(&content_type)?)?;
        let level = checker.depth() - 1;
        let parts = read_multipart(checker, level, content_type.is_digest(), options)?;
        trace!(level, parts = parts.len(), "nested multipart");
        return Ok(Message::composite(headers, content_type, encoding, parts));
    }

    let body = Transform::for_encoding(encoding, &mut *checker, options).read_to_vec()?;
    trace!(content_type = %content_type.mime_type(), %encoding, len = body.len(), "body part");
    Ok(Message::leaf(headers, content_type, encoding, body))
}
