//! # BlazeKV - A Redis-Compatible In-Memory Key/Value Server
//!
//! BlazeKV speaks the RESP wire protocol over TCP and serves a typed
//! keyspace of strings, lists, sets, and hashes with per-key TTL
//! expiration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              BlazeKV                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ + Gate      │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘              │
//! │                                               │                     │
//! │  ┌─────────────┐                              ▼                     │
//! │  │    RESP     │    ┌──────────────────────────────────────────┐    │
//! │  │   Decoder/  │    │                Keyspace                  │    │
//! │  │   Encoder   │    │   string │ list │ set │ hash  (+ TTL)    │    │
//! │  └─────────────┘    └──────────────────────────────────────────┘    │
//! │                                               ▲                     │
//! │                     ┌─────────────────────────┴─────────────┐       │
//! │                     │          Expiration Reaper            │       │
//! │                     │        (Background Tokio Task)        │       │
//! │                     └───────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP request decoder and reply encoder
//! - [`storage`]: the typed keyspace with TTL and glob matching
//! - [`commands`]: command dispatch and handlers
//! - [`connection`]: per-client request/response loop
//! - [`server`]: accept loop, connection gate, graceful shutdown
//! - [`config`]: environment-driven configuration
//!
//! ## Design Highlights
//!
//! Keys with a TTL expire two ways: lazily, when an expired entry is next
//! observed, and actively, through a background reaper sweeping on a fixed
//! period. Either way a client never sees an expired value.
//!
//! Each connection is an independent Tokio task; the keyspace is the only
//! shared mutable state and every command against it is atomic.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{decode_request, DecodeError, Reply};
pub use server::Server;
pub use storage::Keyspace;

/// Version of BlazeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
