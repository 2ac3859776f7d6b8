//! Incremental RESP Parser
//!
//! The transport is a byte stream, so a read may deliver half a frame or
//! several frames back to back. The parser therefore works on a borrowed
//! buffer and reports one of three outcomes:
//!
//! - `Ok(Some((value, consumed)))` - one complete frame was decoded from the
//!   front of the buffer, using `consumed` bytes
//! - `Ok(None)` - the buffer holds an incomplete frame, read more bytes and
//!   try again
//! - `Err(ParseError)` - the bytes can never become a valid frame; the
//!   connection must be closed
//!
//! The parser never consumes anything itself. The caller advances its buffer
//! by `consumed` and keeps the remainder for the next frame.

use crate::protocol::types::{line_text, prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
///
/// All of them are fatal to the connection that produced the bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer or length prefix
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Longest length or integer line we accept: a sign plus the 19 digits of
/// `i64::MAX`.
const MAX_NUMBER_LINE: usize = 20;

/// Longest simple string or error line we accept, excluding CRLF.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// An incremental RESP parser.
///
/// # Example
///
/// ```
/// use respite::protocol::{RespParser, RespValue};
/// use bytes::{Buf, BytesMut};
///
/// let parser = RespParser::new();
/// let mut buffer = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*1\r\n$4"[..]);
///
/// let (value, consumed) = parser.parse(&buffer).unwrap().unwrap();
/// buffer.advance(consumed);
/// assert!(matches!(value, RespValue::Array(_)));
///
/// // The second frame is incomplete.
/// assert!(parser.parse(&buffer).unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct RespParser {
    max_bulk_size: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    pub fn new() -> Self {
        Self {
            max_bulk_size: MAX_BULK_SIZE,
        }
    }

    /// Creates a parser that rejects bulk strings longer than `max` bytes.
    pub fn with_max_bulk_size(max: usize) -> Self {
        Self { max_bulk_size: max }
    }

    /// Attempts to parse one RESP value from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.parse_value(buf, 0)
    }

    fn parse_value(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => parse_line(buf).map(|parsed| {
                parsed.map(|(s, consumed)| (RespValue::SimpleString(s), consumed))
            }),
            prefix::ERROR => parse_line(buf)
                .map(|parsed| parsed.map(|(s, consumed)| (RespValue::Error(s), consumed))),
            prefix::INTEGER => parse_number(buf)
                .map(|parsed| parsed.map(|(n, consumed)| (RespValue::Integer(n), consumed))),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf, depth),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length, header_len) = match parse_number(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }

        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = usize::try_from(length).map_err(|_| ParseError::MessageTooLarge {
            size: usize::MAX,
            max: self.max_bulk_size,
        })?;

        if length > self.max_bulk_size {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: self.max_bulk_size,
            });
        }

        let data_end = header_len + length;
        let total_needed = data_end + CRLF.len();

        // A wrong byte right after the payload can't be fixed by more input.
        let available_tail = &buf[data_end.min(buf.len())..total_needed.min(buf.len())];
        if available_tail != &CRLF[..available_tail.len()] {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        if buf.len() < total_needed {
            return Ok(None);
        }

        let data = Bytes::copy_from_slice(&buf[header_len..data_end]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, mut consumed) = match parse_number(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        // Every element takes at least 3 bytes, so don't trust the count for
        // preallocation beyond what the buffer could possibly hold.
        let capacity = (count as usize).min(buf.len() / 3);
        let mut elements = Vec::with_capacity(capacity);

        for _ in 0..count {
            match self.parse_value(&buf[consumed..], depth + 1)? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Parses a `<prefix><text>\r\n` line into its text.
///
/// Only the first `MAX_LINE_LENGTH + 2` bytes are searched, so a line that
/// never ends costs a bounded scan per read and fails once it is too long.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
    let body = scan_window(&buf[1..], MAX_LINE_LENGTH);
    match find_crlf(body) {
        Some(pos) => {
            let s = std::str::from_utf8(&body[..pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((s.to_string(), 1 + pos + CRLF.len())))
        }
        None => {
            let pending = body.strip_suffix(b"\r").unwrap_or(body);
            if pending.len() > MAX_LINE_LENGTH {
                return Err(ParseError::ProtocolError(format!(
                    "line exceeds {} bytes",
                    MAX_LINE_LENGTH
                )));
            }
            Ok(None)
        }
    }
}

/// Parses a `<prefix><decimal>\r\n` line, used for integers and for the
/// length header of bulk strings and arrays.
///
/// Only an optional leading `-` followed by ASCII digits is accepted. Bad
/// bytes are reported as soon as they arrive rather than after the CRLF.
fn parse_number(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let body = scan_window(&buf[1..], MAX_NUMBER_LINE);
    let line_len = match find_crlf(body) {
        Some(pos) => pos,
        None => {
            let pending = body.strip_suffix(b"\r").unwrap_or(body);
            if pending.len() > MAX_NUMBER_LINE || !is_number_prefix(pending) {
                return Err(invalid_number(pending));
            }
            return Ok(None);
        }
    };

    let line = &body[..line_len];
    let digits = line.strip_prefix(b"-").unwrap_or(line);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid_number(line));
    }

    // All ASCII at this point, so the UTF-8 conversion cannot fail.
    let n = std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| invalid_number(line))?;

    Ok(Some((n, 1 + line_len + CRLF.len())))
}

fn is_number_prefix(partial: &[u8]) -> bool {
    let digits = partial.strip_prefix(b"-").unwrap_or(partial);
    digits.iter().all(u8::is_ascii_digit)
}

fn invalid_number(raw: &[u8]) -> ParseError {
    ParseError::InvalidInteger(line_text(raw))
}

/// The part of a line body that can hold a line of at most `max` bytes, its
/// CRLF, and nothing more.
fn scan_window(body: &[u8], max: usize) -> &[u8] {
    &body[..body.len().min(max + CRLF.len())]
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single RESP message from bytes with the default limits.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
