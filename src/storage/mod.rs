//! Typed Keyspace Module
//!
//! The storage layer of the server: a sharded, thread-safe map from byte
//! keys to tagged values (string, list, set, hash) with TTL support.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │    Expiration Reaper      │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! - **Tagged values**: every key holds exactly one variant; operations on
//!   the wrong variant fail without mutating
//! - **Lazy expiry**: expired keys are treated as absent and removed when
//!   observed
//! - **Active expiry**: the reaper sweeps shards on a fixed period
//! - **Glob matching**: `KEYS` patterns are matched over raw key bytes

pub mod expiry;
pub mod keyspace;
pub mod pattern;
pub mod value;

pub use expiry::start_reaper;
pub use keyspace::{IncrError, Keyspace};
pub use pattern::glob_match;
pub use value::{parse_decimal, Entry, TypedResult, Value, ValueKind, WrongType};
