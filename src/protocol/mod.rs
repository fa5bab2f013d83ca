//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol
//! that the server speaks: inbound requests are arrays of bulk strings, and
//! outbound replies are one of six shapes (simple string, error, integer,
//! bulk, null bulk, array of bulks).
//!
//! ## Modules
//!
//! - `types`: the [`Reply`] enum and its wire serialization
//! - `parser`: the streaming request decoder
//!
//! ## Example
//!
//! ```
//! use blazekv::protocol::{decode_request, Reply};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (args, consumed) = decode_request(data).unwrap().unwrap();
//! assert_eq!(args[0], Bytes::from("GET"));
//! assert_eq!(consumed, data.len());
//!
//! let reply = Reply::bulk(Bytes::from("alice"));
//! assert_eq!(reply.to_bytes(), b"$5\r\nalice\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode_request, DecodeError, DecodeResult, MAX_BULK_SIZE};
pub use types::Reply;
