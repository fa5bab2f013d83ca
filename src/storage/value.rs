//! Tagged Values
//!
//! Every key in the keyspace maps to exactly one [`Value`] variant. A
//! command that operates on the wrong variant gets a [`WrongType`] error and
//! must not mutate anything. The `ZSet` kind is reserved so that a future
//! sorted-set extension does not change the public `TYPE` surface; no value
//! is ever stored with it.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error returned when a key holds a different variant than the operation
/// expects.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation against a key holding the wrong kind of value")]
pub struct WrongType;

/// Result type for variant-checked keyspace operations.
pub type TypedResult<T> = Result<T, WrongType>;

/// The runtime type of a stored value, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    List,
    Set,
    Hash,
    /// Reserved; no commands produce this kind.
    ZSet,
}

impl ValueKind {
    /// The lowercase name used in `TYPE` replies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::Hash => "hash",
            ValueKind::ZSet => "zset",
        }
    }
}

/// A stored value: one of the four concrete variants.
#[derive(Debug, Clone)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::Hash(_) => ValueKind::Hash,
        }
    }

    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            Value::String(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&VecDeque<Bytes>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut VecDeque<Bytes>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&HashSet<Bytes>> {
        match self {
            Value::Set(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut HashSet<Bytes>> {
        match self {
            Value::Set(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(fields) => Some(fields),
            _ => None,
        }
    }
}

/// A keyspace entry: the tagged value plus its optional expiration instant.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    /// When this entry expires (None = never)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry that expires `ttl` from now.
    pub fn with_ttl(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    /// Checks whether this entry has expired. Expired entries are treated as
    /// absent by every read and removed on first observation.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// Parses the canonical decimal form of a signed 64-bit integer.
///
/// Canonical means: an optional leading minus, no leading zeros (except
/// `"0"` itself), no plus sign, no whitespace. This is the only form the
/// numeric commands accept, and the form they write back.
pub fn parse_decimal(raw: &[u8]) -> Option<i64> {
    let digits = match raw.split_first() {
        Some((b'-', rest)) => rest,
        _ => raw,
    };

    if digits.is_empty() || !digits.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits[0] == b'0' {
        return None;
    }
    // "-0" is not the canonical form of zero.
    if raw[0] == b'-' && digits == b"0" {
        return None;
    }

    std::str::from_utf8(raw).ok()?.parse::<i64>().ok()
}
