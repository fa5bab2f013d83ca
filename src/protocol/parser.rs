//! Streaming RESP Request Decoder
//!
//! Client requests are RESP arrays whose elements are bulk strings, e.g.
//! `*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nalice\r\n`. This module decodes one
//! request at a time from an accumulation buffer.
//!
//! ## How decoding works
//!
//! [`decode_request`] reads from a byte slice and returns:
//!
//! - `Ok(Some((args, consumed)))` - a full request was decoded; `consumed`
//!   bytes of the buffer belong to it
//! - `Ok(None)` - the buffer holds an incomplete request, read more bytes
//! - `Err(DecodeError)` - the stream violates the framing rules
//!
//! The caller appends incoming socket data to a buffer, calls
//! [`decode_request`] until it returns `Ok(None)`, and advances the buffer by
//! `consumed` after each decoded request. A decode error is unrecoverable for
//! the connection: the stream position is no longer trustworthy, so the
//! caller must drop the connection.
//!
//! Anything other than an array of bulk strings at the top level is a framing
//! error. A client that sends `*0\r\n` or a null array gets an empty argument
//! vector back, which the dispatcher skips.

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that make the inbound stream undecodable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The request did not start with the array prefix `*`
    #[error("expected array prefix '*', got {0:#04x}")]
    ExpectedArray(u8),

    /// An array element did not start with the bulk prefix `$`
    #[error("expected bulk string prefix '$', got {0:#04x}")]
    ExpectedBulk(u8),

    /// A length line was not a decimal integer
    #[error("invalid length line: {0}")]
    InvalidLength(String),

    /// A bulk string length below -1
    #[error("invalid bulk string length: {0}")]
    NegativeBulkLength(i64),

    /// A bulk string payload was not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// A declared size exceeds what the server accepts
    #[error("request too large: {size} (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Maximum size of a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in one request
pub const MAX_ARGS: usize = 1024 * 1024;

/// Attempts to decode one client request from `buf`.
///
/// Returns the argument vector (command name included as the first element)
/// and the number of bytes consumed, or `None` if the buffer does not yet
/// hold a complete request.
pub fn decode_request(buf: &[u8]) -> DecodeResult<Option<(Vec<Bytes>, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] != prefix::ARRAY {
        return Err(DecodeError::ExpectedArray(buf[0]));
    }

    let (count, mut consumed) = match read_length_line(&buf[1..])? {
        Some((n, line_len)) => (n, 1 + line_len),
        None => return Ok(None),
    };

    // `*0` and null arrays decode to an empty argument vector; the
    // dispatcher treats those as no-ops.
    if count <= 0 {
        return Ok(Some((Vec::new(), consumed)));
    }

    let count = count as usize;
    if count > MAX_ARGS {
        return Err(DecodeError::TooLarge {
            size: count,
            max: MAX_ARGS,
        });
    }

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        match decode_bulk(&buf[consumed..])? {
            Some((arg, used)) => {
                args.push(arg);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((args, consumed)))
}

/// Decodes a single bulk string: `$<length>\r\n<data>\r\n`.
fn decode_bulk(buf: &[u8]) -> DecodeResult<Option<(Bytes, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    if first != prefix::BULK_STRING {
        return Err(DecodeError::ExpectedBulk(first));
    }

    let (length, header_len) = match read_length_line(&buf[1..])? {
        Some((n, line_len)) => (n, 1 + line_len),
        None => return Ok(None),
    };

    // Null bulks are tolerated as empty arguments; clients do not normally
    // send them inside a command.
    if length == -1 {
        return Ok(Some((Bytes::new(), header_len)));
    }

    if length < 0 {
        return Err(DecodeError::NegativeBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(DecodeError::TooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total = header_len + length + CRLF.len();
    if buf.len() < total {
        return Ok(None);
    }

    if &buf[header_len + length..total] != CRLF {
        return Err(DecodeError::MissingCrlf);
    }

    let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
    Ok(Some((data, total)))
}

/// Reads a CRLF-terminated decimal integer.
///
/// Returns the value and the number of bytes consumed including the CRLF,
/// or `None` if the line is not yet complete.
fn read_length_line(buf: &[u8]) -> DecodeResult<Option<(i64, usize)>> {
    let Some(pos) = find_crlf(buf) else {
        return Ok(None);
    };

    let line = &buf[..pos];
    let text = std::str::from_utf8(line)
        .map_err(|_| DecodeError::InvalidLength(format!("{:?}", line)))?;
    let n: i64 = text
        .parse()
        .map_err(|_| DecodeError::InvalidLength(text.to_string()))?;

    Ok(Some((n, pos + CRLF.len())))
}

/// Finds the position of `\r` in the first CRLF pair, if present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_args(input: &[u8]) -> Vec<Bytes> {
        decode_request(input).unwrap().unwrap().0
    }

    #[test]
    fn test_decode_single_command() {
        let input = b"*1\r\n$4\r\nPING\r\n";
        let (args, consumed) = decode_request(input).unwrap().unwrap();
        assert_eq!(args, vec![Bytes::from("PING")]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_decode_set_command() {
        let input = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$5\r\nalice\r\n";
        assert_eq!(
            decode_args(input),
            vec![
                Bytes::from("SET"),
                Bytes::from("user:101"),
                Bytes::from("alice"),
            ]
        );
    }

    #[test]
    fn test_decode_empty_array_is_empty_args() {
        let input = b"*0\r\n";
        let (args, consumed) = decode_request(input).unwrap().unwrap();
        assert!(args.is_empty());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_decode_null_array_is_empty_args() {
        let (args, _) = decode_request(b"*-1\r\n").unwrap().unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn test_decode_null_bulk_tolerated_as_empty() {
        let input = b"*2\r\n$4\r\nECHO\r\n$-1\r\n";
        assert_eq!(decode_args(input), vec![Bytes::from("ECHO"), Bytes::new()]);
    }

    #[test]
    fn test_decode_empty_bulk() {
        let input = b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n";
        assert_eq!(decode_args(input), vec![Bytes::from("ECHO"), Bytes::new()]);
    }

    #[test]
    fn test_decode_binary_safe() {
        let input = b"*2\r\n$3\r\nGET\r\n$5\r\nhe\x00lo\r\n";
        assert_eq!(
            decode_args(input),
            vec![Bytes::from("GET"), Bytes::from(&b"he\x00lo"[..])]
        );
    }

    #[test]
    fn test_decode_incomplete_header() {
        assert!(decode_request(b"*2").unwrap().is_none());
        assert!(decode_request(b"*2\r\n$3\r\nGE").unwrap().is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        assert!(decode_request(b"*1\r\n$4\r\nPIN").unwrap().is_none());
    }

    #[test]
    fn test_decode_pipelined_requests() {
        let input = b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n";
        let (first, consumed) = decode_request(input).unwrap().unwrap();
        assert_eq!(first, vec![Bytes::from("PING")]);

        let (second, _) = decode_request(&input[consumed..]).unwrap().unwrap();
        assert_eq!(second, vec![Bytes::from("GET"), Bytes::from("k")]);
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(matches!(
            decode_request(b"+PING\r\n"),
            Err(DecodeError::ExpectedArray(b'+'))
        ));
        assert!(matches!(
            decode_request(b"PING\r\n"),
            Err(DecodeError::ExpectedArray(b'P'))
        ));
    }

    #[test]
    fn test_decode_rejects_non_bulk_element() {
        assert!(matches!(
            decode_request(b"*1\r\n:42\r\n"),
            Err(DecodeError::ExpectedBulk(b':'))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        assert!(matches!(
            decode_request(b"*abc\r\n"),
            Err(DecodeError::InvalidLength(_))
        ));
        assert!(matches!(
            decode_request(b"*1\r\n$xyz\r\n"),
            Err(DecodeError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_decode_rejects_negative_bulk_length() {
        assert!(matches!(
            decode_request(b"*1\r\n$-2\r\n"),
            Err(DecodeError::NegativeBulkLength(-2))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_trailing_crlf() {
        assert!(matches!(
            decode_request(b"*1\r\n$4\r\nPINGxx"),
            Err(DecodeError::MissingCrlf)
        ));
    }

    #[test]
    fn test_roundtrip_encoded_arrays() {
        use crate::protocol::Reply;

        // Every array the encoder can emit decodes back to the same bulks.
        let cases: Vec<Vec<Bytes>> = vec![
            vec![Bytes::from("PING")],
            vec![Bytes::from("SET"), Bytes::from("key"), Bytes::from("value")],
            vec![Bytes::from("ECHO"), Bytes::new()],
            vec![Bytes::from("GET"), Bytes::from(&b"bin\x00\xff"[..])],
        ];

        for args in cases {
            let wire = Reply::array(args.clone()).to_bytes();
            let (decoded, consumed) = decode_request(&wire).unwrap().unwrap();
            assert_eq!(decoded, args);
            assert_eq!(consumed, wire.len());
        }

        // The empty array decodes to the empty argument vector.
        let wire = Reply::array(vec![]).to_bytes();
        let (decoded, consumed) = decode_request(&wire).unwrap().unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn test_decode_rejects_oversized_argument_count() {
        let input = format!("*{}\r\n", MAX_ARGS + 1);
        assert!(matches!(
            decode_request(input.as_bytes()),
            Err(DecodeError::TooLarge { .. })
        ));
    }
}
