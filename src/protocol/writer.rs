//! Reply Serializer
//!
//! Append-only builders for the reply tokens SwiftKV emits. Every function
//! appends one token to a caller-owned buffer, so the connection driver can
//! accumulate an entire pipeline's worth of replies and hand them to the
//! socket in a single write.
//!
//! Integer fields are formatted into a stack buffer; the reply path never
//! allocates.

use crate::protocol::{prefix, CRLF};

/// Appends a simple string reply: `+<text>\r\n`.
pub fn append_simple(out: &mut Vec<u8>, text: &str) {
    out.push(prefix::SIMPLE_STRING);
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(CRLF);
}

/// Appends an error reply: `-<message>\r\n`.
pub fn append_error(out: &mut Vec<u8>, message: &str) {
    out.push(prefix::ERROR);
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(CRLF);
}

/// Appends a bulk string reply: `$<len>\r\n<data>\r\n`.
pub fn append_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(prefix::BULK_STRING);
    append_decimal(out, data.len() as i64);
    out.extend_from_slice(CRLF);
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}

/// Appends the nil bulk reply: `$-1\r\n`.
pub fn append_null_bulk(out: &mut Vec<u8>) {
    out.extend_from_slice(b"$-1\r\n");
}

/// Appends an integer reply: `:<n>\r\n`.
pub fn append_int(out: &mut Vec<u8>, n: i64) {
    out.push(prefix::INTEGER);
    append_decimal(out, n);
    out.extend_from_slice(CRLF);
}

/// Appends the empty array reply: `*0\r\n`.
pub fn append_empty_array(out: &mut Vec<u8>) {
    out.extend_from_slice(b"*0\r\n");
}

/// Appends the ASCII decimal form of `n` without going through a heap
/// allocation. `i64::MIN` is handled by negating in unsigned space.
pub fn append_decimal(out: &mut Vec<u8>, n: i64) {
    if n == 0 {
        out.push(b'0');
        return;
    }

    let mut magnitude = n.unsigned_abs();
    if n < 0 {
        out.push(b'-');
    }

    let mut digits = [0u8; 20];
    let mut i = digits.len();
    while magnitude > 0 {
        i -= 1;
        digits[i] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
    }
    out.extend_from_slice(&digits[i..]);
}
