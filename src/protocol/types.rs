//! RESP Reply Types
//!
//! This module defines the reply shapes the server can send back to a client.
//! RESP is a simple, binary-safe protocol; every value starts with a type
//! prefix byte and every line ends with CRLF (`\r\n`).
//!
//! ## Reply shapes
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null Bulk String: `$-1\r\n`
//! Array of Bulk Strings: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`
//!
//! The server only ever emits these six shapes; nested arrays and non-bulk
//! array elements never appear in replies.

use bytes::Bytes;

/// The CRLF terminator used in the RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single top-level reply to a client request.
///
/// Each request produces exactly one of these, serialized onto the
/// connection by the worker that decoded the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Non-binary-safe status line. Format: `+<string>\r\n`
    Simple(String),

    /// Error condition reported to the client. Format: `-<message>\r\n`
    Error(String),

    /// 64-bit signed integer. Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe string. Format: `$<length>\r\n<data>\r\n`
    Bulk(Bytes),

    /// The "absent" reply. Format: `$-1\r\n`
    NullBulk,

    /// A flat array of bulk strings. Format: `*<count>\r\n<bulk>...`
    Array(Vec<Bytes>),
}

impl Reply {
    /// Creates a simple-string reply.
    pub fn simple(s: impl Into<String>) -> Self {
        Reply::Simple(s.into())
    }

    /// Creates an error reply.
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Creates an integer reply.
    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a bulk-string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Creates the null-bulk ("absent") reply.
    pub fn null() -> Self {
        Reply::NullBulk
    }

    /// Creates an array-of-bulks reply.
    pub fn array(items: Vec<Bytes>) -> Self {
        Reply::Array(items)
    }

    /// The `+OK` reply shared by every successful write command.
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    /// The `+PONG` reply to a bare PING.
    pub fn pong() -> Self {
        Reply::Simple("PONG".to_string())
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes the reply to its wire representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// More efficient than [`Reply::to_bytes`] when a buffer is reused
    /// across replies.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Simple(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(data) => write_bulk(buf, data),
            Reply::NullBulk => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Array(items) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for item in items {
                    write_bulk(buf, item);
                }
            }
        }
    }
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(prefix::BULK_STRING);
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(data);
    buf.extend_from_slice(CRLF);
}
