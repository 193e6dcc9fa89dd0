//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol
//! that SwiftKV speaks on the wire: requests are arrays of bulk strings,
//! replies are simple strings, errors, integers, bulk strings and the
//! empty array.
//!
//! ## Modules
//!
//! - `parser`: request framer that decodes one pipelined command at a time
//!   without copying argument bytes
//! - `writer`: append-only reply serializers that build batched responses
//!   in a caller-owned buffer
//!
//! ## Example
//!
//! ```
//! use swiftkv::protocol::{parser, writer};
//!
//! let frame = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let mut args = Vec::new();
//! let consumed = parser::parse_request(frame, &mut args).unwrap().unwrap();
//! assert_eq!(consumed, frame.len());
//! assert_eq!(&frame[args[0].clone()], b"GET");
//!
//! let mut out = Vec::new();
//! writer::append_simple(&mut out, "OK");
//! assert_eq!(out, b"+OK\r\n");
//! ```

pub mod parser;
pub mod writer;

pub use parser::{parse_request, ArgSpan, ParseError};

/// The CRLF terminator used by the RESP protocol.
pub const CRLF: &[u8] = b"\r\n";

/// RESP type prefix bytes.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}
