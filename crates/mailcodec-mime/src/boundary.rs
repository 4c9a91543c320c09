//! Multipart boundary detection (RFC 2046 §5.1).
//!
//! [`BoundaryChecker`] sits between the raw message stream and a part's body
//! transform. It passes body bytes through until it sees a delimiter line
//! for any boundary on its stack, then reports end of stream and records
//! which delimiter was found. The CRLF before a delimiter belongs to the
//! delimiter and is never emitted.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::source::{ByteSource, Pushback};

/// Longest boundary RFC 2046 allows.
pub const MAX_BOUNDARY_LENGTH: usize = 70;

/// Candidate bytes examined after `--`: a boundary plus a closing `--`.
const SCRATCH_LIMIT: usize = MAX_BOUNDARY_LENGTH + 2;

const fn is_bchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?' | b' '
        )
}

/// Checks a boundary parameter against RFC 2046: 1 to 70 bchars, not
/// ending in a space.
///
/// # Errors
///
/// Returns [`Error::Structural`] describing the first violation.
pub fn validate_boundary(boundary: &str) -> Result<()> {
    let bytes = boundary.as_bytes();
    if bytes.is_empty() {
        return Err(Error::structural("empty multipart boundary"));
    }
    if bytes.len() > MAX_BOUNDARY_LENGTH {
        return Err(Error::structural(format!(
            "multipart boundary longer than {MAX_BOUNDARY_LENGTH} characters"
        )));
    }
    if bytes.ends_with(b" ") {
        return Err(Error::structural("multipart boundary ends with a space"));
    }
    if let Some(&b) = bytes.iter().find(|&&b| !is_bchar(b)) {
        return Err(Error::structural(format!(
            "invalid character {:?} in multipart boundary",
            char::from(b)
        )));
    }
    Ok(())
}

/// A delimiter line that ended the current body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    /// Stack index of the matched boundary; 0 is the outermost.
    pub depth: usize,
    /// True for a closing delimiter (`--boundary--`).
    pub closing: bool,
}

/// What the checker is doing with the bytes it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Passing body bytes through and watching for delimiter lines.
    Body,
    /// Examining a line that starts with `--`.
    Checking,
    /// Passing a part's header bytes through unexamined.
    Headers,
    /// The outermost closing delimiter has been seen.
    Done,
}

/// Splits one byte stream into multipart bodies.
#[derive(Debug)]
pub struct BoundaryChecker<S> {
    source: Pushback<S>,
    boundaries: Vec<String>,
    state: State,
    // True when the next byte begins a line that has not been examined.
    at_line_start: bool,
    scratch: Vec<u8>,
    replay: VecDeque<u8>,
    pending: Option<Delimiter>,
    lenient_line_breaks: bool,
}

impl<S: ByteSource> BoundaryChecker<S> {
    /// Wraps a source positioned at the start of a multipart body.
    pub fn new(source: S) -> Self {
        Self {
            source: Pushback::new(source),
            boundaries: Vec::new(),
            state: State::Body,
            at_line_start: true,
            scratch: Vec::with_capacity(SCRATCH_LIMIT),
            replay: VecDeque::with_capacity(SCRATCH_LIMIT + 4),
            pending: None,
            lenient_line_breaks: false,
        }
    }

    /// Also recognises delimiters after a bare LF.
    #[must_use]
    pub const fn lenient_line_breaks(mut self, lenient: bool) -> Self {
        self.lenient_line_breaks = lenient;
        self
    }

    /// Pushes the boundary of a multipart about to be read.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary fails [`validate_boundary`].
    pub fn push_boundary(&mut self, boundary: &str) -> Result<()> {
        validate_boundary(boundary)?;
        tracing::trace!(boundary, depth = self.boundaries.len(), "push boundary");
        self.boundaries.push(boundary.to_string());
        if self.state == State::Done {
            self.state = State::Body;
        }
        Ok(())
    }

    /// Number of active boundaries.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.boundaries.len()
    }

    /// Active boundaries, outermost first.
    #[must_use]
    pub fn boundaries(&self) -> &[String] {
        &self.boundaries
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// The delimiter that ended the current body, if any.
    #[must_use]
    pub const fn pending_delimiter(&self) -> Option<Delimiter> {
        self.pending
    }

    /// Consumes the pending delimiter so reading can continue past it.
    pub fn take_delimiter(&mut self) -> Option<Delimiter> {
        let delimiter = self.pending.take();
        if delimiter.is_some() && self.state != State::Done {
            self.state = State::Body;
        }
        delimiter
    }

    /// Marks the start of a part's header block.
    pub fn start_part_headers(&mut self) {
        debug_assert!(self.pending.is_none(), "delimiter not taken");
        if self.state != State::Done {
            self.state = State::Headers;
        }
    }

    /// Marks the end of a part's header block; its body follows.
    pub fn end_part_headers(&mut self) {
        if self.state == State::Headers {
            self.state = State::Body;
            self.at_line_start = true;
        }
    }

    /// Returns a byte read past the end of a header block to the stream.
    pub fn unread(&mut self, byte: u8) {
        self.replay.push_front(byte);
    }

    fn skip_to_line_end(&mut self) -> Result<()> {
        loop {
            match self.source.next_byte()? {
                None | Some(b'\n') => return Ok(()),
                Some(b'\r') => {
                    let next = self.source.next_byte()?;
                    if next != Some(b'\n') {
                        self.source.unget_opt(next);
                    }
                    return Ok(());
                }
                Some(_) => {}
            }
        }
    }

    /// Examines a line start. On a match, records the delimiter and returns
    /// true; otherwise queues the consumed bytes, after the held-back line
    /// break, for replay as body data.
    fn check_line(&mut self, held: &'static [u8]) -> Result<bool> {
        let first = self.source.next_byte()?;
        if first != Some(b'-') {
            self.source.unget_opt(first);
            self.replay.extend(held);
            return Ok(false);
        }
        let second = self.source.next_byte()?;
        if second != Some(b'-') {
            self.source.unget_opt(second);
            self.replay.extend(held);
            self.replay.push_back(b'-');
            return Ok(false);
        }

        self.state = State::Checking;
        self.scratch.clear();
        while self.scratch.len() < SCRATCH_LIMIT {
            match self.source.next_byte()? {
                Some(b) if b != b'\r' && b != b'\n' && b < 0x80 => self.scratch.push(b),
                other => {
                    self.source.unget_opt(other);
                    break;
                }
            }
        }

        let found = self.boundaries.iter().enumerate().rev().find_map(|(i, b)| {
            let rest = self.scratch.strip_prefix(b.as_bytes())?;
            Some((i, rest.starts_with(b"--")))
        });

        let Some((depth, closing)) = found else {
            self.state = State::Body;
            self.replay.extend(held);
            self.replay.extend(b"--");
            self.replay.extend(self.scratch.drain(..));
            return Ok(false);
        };

        if depth + 1 < self.boundaries.len() {
            tracing::warn!(
                boundary = %self.boundaries[depth],
                unclosed = self.boundaries.len() - depth - 1,
                "delimiter closes nested multiparts implicitly"
            );
        }
        tracing::debug!(boundary = %self.boundaries[depth], depth, closing, "delimiter");
        self.boundaries.truncate(if closing { depth } else { depth + 1 });
        self.skip_to_line_end()?;
        self.at_line_start = true;
        self.pending = Some(Delimiter { depth, closing });
        self.state = if self.boundaries.is_empty() {
            State::Done
        } else {
            State::Body
        };
        Ok(true)
    }
}

impl<S: ByteSource> ByteSource for BoundaryChecker<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        loop {
            if let Some(b) = self.replay.pop_front() {
                return Ok(Some(b));
            }
            match self.state {
                State::Done => return Ok(None),
                State::Headers => return self.source.next_byte(),
                State::Body | State::Checking => {}
            }
            if self.pending.is_some() {
                return Ok(None);
            }
            if self.at_line_start {
                self.at_line_start = false;
                if self.check_line(b"")? {
                    return Ok(None);
                }
                continue;
            }
            let Some(c) = self.source.next_byte()? else {
                return Ok(None);
            };
            if c == b'\n' && self.lenient_line_breaks {
                if self.check_line(b"\n")? {
                    return Ok(None);
                }
                continue;
            }
            if c != b'\r' {
                return Ok(Some(c));
            }
            let next = self.source.next_byte()?;
            if next != Some(b'\n') {
                self.source.unget_opt(next);
                return Ok(Some(b'\r'));
            }
            if self.check_line(b"\r\n")? {
                return Ok(None);
            }
        }
    }
}
