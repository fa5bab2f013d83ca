//! Command Processing Module
//!
//! Receives decoded argument vectors, dispatches them case-insensitively to
//! the matching handler, and produces exactly one reply per request.
//!
//! ## Supported commands
//!
//! - Strings: `SET` (with `EX`), `GET`, `DEL`, `EXISTS`, `KEYS`, `TYPE`
//! - Counters: `INCR`, `DECR`, `INCRBY`, `DECRBY`
//! - Lists: `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`, `LRANGE`
//! - Sets: `SADD`, `SMEMBERS`, `SISMEMBER`
//! - Hashes: `HSET`, `HGET`, `HGETALL`
//! - Server: `PING`, `ECHO`, `DBSIZE`, `FLUSHALL`, `ALAIDE`

pub mod handler;

pub use handler::CommandHandler;
