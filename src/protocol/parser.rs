//! Request Framer
//!
//! Decodes pipelined RESP requests (`*<argc>\r\n` followed by bulk-string
//! arguments) from a raw byte window. The parser is stateless and makes no
//! copies: on success it fills a caller-owned vector with the byte ranges
//! of each argument inside the input buffer.
//!
//! ## Contract
//!
//! A call to [`parse_request`] returns one of:
//!
//! - `Ok(Some(consumed))` - exactly one complete request was present at
//!   offset 0; `consumed` is its total length and `args` holds the
//!   argument spans
//! - `Ok(None)` - the buffer holds a prefix of a request; the caller reads
//!   more bytes and retries with the same buffer
//! - `Err(e)` - the bytes cannot be a valid request; fatal for the
//!   connection
//!
//! The argument spans reference the input buffer directly, so the caller
//! must consume them (copying anything it wants to keep) before advancing
//! the buffer past `consumed`.

use std::ops::Range;

use thiserror::Error;

use crate::protocol::prefix;

/// Byte range of one argument inside the inbound buffer.
pub type ArgSpan = Range<usize>;

/// Maximum size for a single bulk string (512 MB, same as Redis).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Errors that make a request frame undecodable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The frame does not start with the array prefix `*`.
    #[error("expected array prefix, found {0:#04x}")]
    ExpectedArray(u8),

    /// An array element does not start with the bulk-string prefix `$`.
    #[error("expected bulk string prefix, found {0:#04x}")]
    ExpectedBulkString(u8),

    /// A length field is not a valid ASCII decimal.
    #[error("invalid decimal field")]
    InvalidInteger,

    /// The array element count is negative.
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// A bulk string length is negative (other than the `-1` nil marker).
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// A bulk string exceeds the maximum allowed size.
    #[error("bulk string too large: {size} bytes (max: {max})")]
    BulkTooLarge { size: usize, max: usize },

    /// A bulk string payload is not followed by CRLF.
    #[error("bulk string missing trailing CRLF")]
    MissingTerminator,
}

/// Attempts to decode one complete request starting at offset 0 of `buf`.
///
/// `args` is cleared and, on `Ok(Some(_))`, filled with one span per
/// argument. It is reused across calls so a connection parses an entire
/// pipeline without reallocating.
pub fn parse_request(buf: &[u8], args: &mut Vec<ArgSpan>) -> Result<Option<usize>, ParseError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != prefix::ARRAY {
        return Err(ParseError::ExpectedArray(buf[0]));
    }

    let header_end = match find_crlf(buf, 1) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let count = parse_decimal(&buf[1..header_end])?;
    if count < 0 {
        return Err(ParseError::InvalidArrayLength(count));
    }

    args.clear();
    let mut idx = header_end + 2;

    for _ in 0..count {
        if idx >= buf.len() {
            return Ok(None);
        }
        if buf[idx] != prefix::BULK_STRING {
            return Err(ParseError::ExpectedBulkString(buf[idx]));
        }

        let len_end = match find_crlf(buf, idx + 1) {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let len = parse_decimal(&buf[idx + 1..len_end])?;
        idx = len_end + 2;

        // A nil bulk inside a request decodes as an empty argument.
        if len == -1 {
            args.push(idx..idx);
            continue;
        }
        if len < 0 {
            return Err(ParseError::InvalidBulkLength(len));
        }
        let len = len as usize;
        if len > MAX_BULK_SIZE {
            return Err(ParseError::BulkTooLarge {
                size: len,
                max: MAX_BULK_SIZE,
            });
        }

        if buf.len() < idx + len + 2 {
            return Ok(None);
        }
        if buf[idx + len] != b'\r' || buf[idx + len + 1] != b'\n' {
            return Err(ParseError::MissingTerminator);
        }

        args.push(idx..idx + len);
        idx += len + 2;
    }

    Ok(Some(idx))
}

/// Finds the next CRLF at or after `from`, returning the index of the `\r`.
#[inline]
fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Parses an ASCII decimal with an optional leading `-`, rejecting empty
/// fields, stray bytes and overflow.
fn parse_decimal(field: &[u8]) -> Result<i64, ParseError> {
    let (negative, digits) = match field.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, field),
    };
    if digits.is_empty() {
        return Err(ParseError::InvalidInteger);
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ParseError::InvalidInteger);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i64))
            .ok_or(ParseError::InvalidInteger)?;
    }

    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, ParseError> {
        let mut spans = Vec::new();
        parse_request(buf, &mut spans).map(|opt| {
            opt.map(|consumed| {
                let args = spans.iter().map(|s| buf[s.clone()].to_vec()).collect();
                (args, consumed)
            })
        })
    }

    #[test]
    fn parse_get_request() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let (args, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(args, vec![b"GET".to_vec(), b"name".to_vec()]);
    }

    #[test]
    fn parse_set_request() {
        let input = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        let (args, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(args, vec![b"SET".to_vec(), b"foo".to_vec(), b"bar".to_vec()]);
    }

    #[test]
    fn parse_empty_array() {
        let (args, consumed) = parse(b"*0\r\n").unwrap().unwrap();
        assert_eq!(consumed, 4);
        assert!(args.is_empty());
    }

    #[test]
    fn parse_empty_argument() {
        let input = b"*1\r\n$0\r\n\r\n";
        let (args, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(args, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn parse_nil_bulk_as_empty_argument() {
        let input = b"*2\r\n$4\r\nPING\r\n$-1\r\n";
        let (args, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(args[1], Vec::<u8>::new());
    }

    #[test]
    fn parse_binary_safe_argument() {
        let input = b"*1\r\n$5\r\nhe\x00\r1\r\n";
        let (args, _) = parse(input).unwrap().unwrap();
        assert_eq!(args[0], b"he\x00\r1".to_vec());
    }

    #[test]
    fn incomplete_header() {
        assert_eq!(parse(b""), Ok(None));
        assert_eq!(parse(b"*"), Ok(None));
        assert_eq!(parse(b"*2\r"), Ok(None));
    }

    #[test]
    fn incomplete_bulk_length() {
        assert_eq!(parse(b"*1\r\n$3"), Ok(None));
        assert_eq!(parse(b"*2\r\n$3\r\nGET\r\n"), Ok(None));
    }

    #[test]
    fn incomplete_bulk_payload() {
        assert_eq!(parse(b"*1\r\n$5\r\nhel"), Ok(None));
        assert_eq!(parse(b"*1\r\n$5\r\nhello"), Ok(None));
        assert_eq!(parse(b"*1\r\n$5\r\nhello\r"), Ok(None));
    }

    #[test]
    fn consumed_stops_at_frame_boundary() {
        // Two pipelined requests: only the first is decoded per call.
        let input = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let (args, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(consumed, 14);
        assert_eq!(args, vec![b"PING".to_vec()]);

        let (args, consumed) = parse(&input[14..]).unwrap().unwrap();
        assert_eq!(consumed, 14);
        assert_eq!(args, vec![b"PING".to_vec()]);
    }

    #[test]
    fn malformed_missing_array_prefix() {
        assert_eq!(parse(b"PING\r\n"), Err(ParseError::ExpectedArray(b'P')));
    }

    #[test]
    fn malformed_element_prefix() {
        assert_eq!(
            parse(b"*1\r\n:123\r\n"),
            Err(ParseError::ExpectedBulkString(b':'))
        );
    }

    #[test]
    fn malformed_array_count() {
        assert_eq!(parse(b"*x\r\n"), Err(ParseError::InvalidInteger));
        assert_eq!(parse(b"*\r\n"), Err(ParseError::InvalidInteger));
        assert_eq!(parse(b"*-2\r\n"), Err(ParseError::InvalidArrayLength(-2)));
    }

    #[test]
    fn malformed_bulk_length() {
        assert_eq!(parse(b"*1\r\n$x\r\n"), Err(ParseError::InvalidInteger));
        assert_eq!(
            parse(b"*1\r\n$-2\r\nab\r\n"),
            Err(ParseError::InvalidBulkLength(-2))
        );
    }

    #[test]
    fn malformed_bulk_terminator() {
        assert_eq!(
            parse(b"*1\r\n$3\r\nGETXX"),
            Err(ParseError::MissingTerminator)
        );
    }

    #[test]
    fn bulk_length_overflow_rejected() {
        assert_eq!(
            parse(b"*1\r\n$99999999999999999999\r\n"),
            Err(ParseError::InvalidInteger)
        );
    }

    #[test]
    fn bulk_length_above_cap_rejected() {
        let input = b"*1\r\n$536870913\r\n";
        assert!(matches!(parse(input), Err(ParseError::BulkTooLarge { .. })));
    }

    #[test]
    fn args_scratch_is_reused() {
        let mut spans = Vec::new();
        let first = b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n";
        parse_request(first, &mut spans).unwrap().unwrap();
        assert_eq!(spans.len(), 2);

        let second = b"*1\r\n$4\r\nPING\r\n";
        parse_request(second, &mut spans).unwrap().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(&second[spans[0].clone()], b"PING");
    }
}
