//! Concurrent Typed Keyspace
//!
//! The keyspace maps opaque byte keys to tagged values with optional TTL.
//! It is sharded: keys are hashed onto independent `RwLock<HashMap>` shards
//! so that connections touching different keys do not contend. Every public
//! operation is atomic - a single-key operation holds exactly one shard lock
//! for its whole duration, including read-then-write sequences like INCR.
//!
//! ## Expiry
//!
//! Keys expire in two ways:
//!
//! 1. **Lazy**: any operation that observes an expired entry treats it as
//!    absent and removes it. Read paths take the shared lock first and only
//!    escalate to the exclusive lock when they find a stale entry.
//! 2. **Active**: the background reaper (see [`crate::storage::expiry`])
//!    periodically calls [`Keyspace::cleanup_expired`].
//!
//! ## Empty containers
//!
//! A list, set, or hash is never observably empty: the operation that drains
//! the last element deletes the key, so `EXISTS` reports 0 and `TYPE`
//! reports `none` afterwards.

use crate::storage::pattern::glob_match;
use crate::storage::value::{parse_decimal, Entry, TypedResult, Value, ValueKind, WrongType};
use bytes::Bytes;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

/// Number of shards. More shards, less lock contention, more per-instance
/// overhead.
const NUM_SHARDS: usize = 64;

type Shard = RwLock<HashMap<Bytes, Entry>>;

/// Errors from the numeric mutators (INCR family).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IncrError {
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("increment or decrement would overflow")]
    Overflow,
}

impl From<WrongType> for IncrError {
    fn from(_: WrongType) -> Self {
        IncrError::WrongType
    }
}

/// The concurrent map at the heart of the server.
///
/// Designed to be wrapped in an `Arc` and shared across every connection
/// worker and the reaper task.
///
/// # Example
///
/// ```
/// use blazekv::storage::Keyspace;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let keyspace = Keyspace::new();
/// keyspace.set(Bytes::from("name"), Bytes::from("alice"), None);
/// assert_eq!(keyspace.get(b"name").unwrap(), Some(Bytes::from("alice")));
///
/// keyspace.set(
///     Bytes::from("session"),
///     Bytes::from("abc123"),
///     Some(Duration::from_secs(60)),
/// );
/// ```
pub struct Keyspace {
    shards: Vec<Shard>,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("shards", &self.shards.len())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Applies `f` to the live entry for `key`, if any.
    ///
    /// Takes the shared lock on the fast path; when the entry turns out to
    /// be expired, escalates to the exclusive lock, re-checks, and removes
    /// the stale entry.
    fn read_entry<R>(&self, key: &[u8], f: impl FnOnce(&Entry) -> R) -> Option<R> {
        let shard = self.shard(key);

        {
            let map = shard.read().unwrap();
            match map.get(key) {
                Some(entry) if !entry.is_expired() => return Some(f(entry)),
                None => return None,
                _ => {}
            }
        }

        // Observed an expired entry under the read lock; take the write
        // lock to remove it. Another writer may have replaced it meanwhile.
        let mut map = shard.write().unwrap();
        if let Some(entry) = map.get(key) {
            if entry.is_expired() {
                map.remove(key);
                return None;
            }
            return Some(f(entry));
        }
        None
    }

    /// Removes `key` from `map` if its entry has expired.
    fn drop_expired(map: &mut HashMap<Bytes, Entry>, key: &[u8]) {
        if map.get(key).is_some_and(|entry| entry.is_expired()) {
            map.remove(key);
        }
    }

    // ------------------------------------------------------------------
    // Generic operations
    // ------------------------------------------------------------------

    /// Unconditionally stores a string value, replacing whatever variant the
    /// key previously held. A `ttl` of `None` stores a persistent entry.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let entry = match ttl {
            Some(ttl) => Entry::with_ttl(Value::String(value), ttl),
            None => Entry::new(Value::String(value)),
        };
        self.shard(&key).write().unwrap().insert(key, entry);
    }

    /// Returns the string stored at `key`, or `None` if the key is absent
    /// (or expired). A key holding another variant is a [`WrongType`] error.
    pub fn get(&self, key: &[u8]) -> TypedResult<Option<Bytes>> {
        self.read_entry(key, |entry| {
            entry.value.as_string().cloned().ok_or(WrongType)
        })
        .transpose()
    }

    /// Deletes `key`. Returns true if a live entry was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut map = self.shard(key).write().unwrap();
        match map.remove(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    /// Deletes every key in `keys`, returning how many were actually removed.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.delete(key)).count() as u64
    }

    /// Checks whether `key` holds a live value.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.read_entry(key, |_| ()).is_some()
    }

    /// Counts how many of `keys` exist. Duplicates count multiply.
    pub fn exists_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.exists(key)).count() as u64
    }

    /// Returns the variant stored at `key`, or `None` for an absent key.
    pub fn kind(&self, key: &[u8]) -> Option<ValueKind> {
        self.read_entry(key, |entry| entry.value.kind())
    }

    /// Counts the live entries across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let map = shard.read().unwrap();
                map.values().filter(|entry| !entry.is_expired()).count()
            })
            .sum()
    }

    /// Returns true if no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every live key matching the glob `pattern`.
    ///
    /// **Warning**: scans the whole keyspace; slow on large databases.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let mut result = Vec::new();
        for shard in &self.shards {
            let map = shard.read().unwrap();
            for (key, entry) in map.iter() {
                if !entry.is_expired() && glob_match(pattern, key) {
                    result.push(key.clone());
                }
            }
        }
        result
    }

    /// Empties the keyspace.
    pub fn flush_all(&self) {
        for shard in &self.shards {
            shard.write().unwrap().clear();
        }
    }

    /// Removes every expired entry. Called by the background reaper.
    ///
    /// Returns the number of entries reclaimed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut reclaimed = 0u64;
        for shard in &self.shards {
            let mut map = shard.write().unwrap();
            let before = map.len();
            map.retain(|_, entry| !entry.is_expired());
            reclaimed += (before - map.len()) as u64;
        }
        reclaimed
    }

    // ------------------------------------------------------------------
    // Numeric operations
    // ------------------------------------------------------------------

    /// Adds `delta` to the integer stored at `key` and returns the new
    /// value. A missing key counts as 0. The stored string must be in
    /// canonical signed decimal form; the result is written back in the
    /// same form, preserving any TTL. Overflow mutates nothing.
    pub fn incr_by(&self, key: Bytes, delta: i64) -> Result<i64, IncrError> {
        let mut map = self.shard(&key).write().unwrap();
        Self::drop_expired(&mut map, &key);

        match map.entry(key) {
            MapEntry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                let data = entry.value.as_string().ok_or(IncrError::WrongType)?;
                let current = parse_decimal(data).ok_or(IncrError::NotAnInteger)?;
                let next = current.checked_add(delta).ok_or(IncrError::Overflow)?;
                entry.value = Value::String(Bytes::from(next.to_string()));
                Ok(next)
            }
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::new(Value::String(Bytes::from(delta.to_string()))));
                Ok(delta)
            }
        }
    }

    // ------------------------------------------------------------------
    // List operations
    // ------------------------------------------------------------------

    /// Pushes `items` onto the head (`left`) or tail of the list at `key`,
    /// creating the list if absent. Returns the new length.
    ///
    /// Items are pushed one at a time, so `LPUSH k a b c` leaves the list
    /// as `[c, b, a]`.
    pub fn list_push(&self, key: Bytes, items: Vec<Bytes>, left: bool) -> TypedResult<usize> {
        let mut map = self.shard(&key).write().unwrap();
        Self::drop_expired(&mut map, &key);

        let entry = map
            .entry(key)
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        let list = entry.value.as_list_mut().ok_or(WrongType)?;

        for item in items {
            if left {
                list.push_front(item);
            } else {
                list.push_back(item);
            }
        }
        Ok(list.len())
    }

    /// Pops one element from the head (`left`) or tail of the list at
    /// `key`. Returns `None` for an absent key. Popping the last element
    /// deletes the key.
    pub fn list_pop(&self, key: &[u8], left: bool) -> TypedResult<Option<Bytes>> {
        let mut map = self.shard(key).write().unwrap();
        Self::drop_expired(&mut map, key);

        let Some(entry) = map.get_mut(key) else {
            return Ok(None);
        };
        let list = entry.value.as_list_mut().ok_or(WrongType)?;

        let popped = if left {
            list.pop_front()
        } else {
            list.pop_back()
        };
        if list.is_empty() {
            map.remove(key);
        }
        Ok(popped)
    }

    /// Returns the length of the list at `key` (0 if absent).
    pub fn list_len(&self, key: &[u8]) -> TypedResult<usize> {
        self.read_entry(key, |entry| {
            entry.value.as_list().map(VecDeque::len).ok_or(WrongType)
        })
        .unwrap_or(Ok(0))
    }

    /// Returns the elements between `start` and `stop`, both inclusive.
    ///
    /// Negative indices count from the end (-1 is the last element). After
    /// normalization `start` clamps to 0 and `stop` to the last index; an
    /// inverted range is empty.
    pub fn list_range(&self, key: &[u8], start: i64, stop: i64) -> TypedResult<Vec<Bytes>> {
        self.read_entry(key, |entry| {
            let list = entry.value.as_list().ok_or(WrongType)?;
            let len = list.len() as i64;

            let start = if start < 0 { len + start } else { start }.max(0);
            let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);

            if start > stop {
                return Ok(Vec::new());
            }

            Ok(list
                .iter()
                .skip(start as usize)
                .take((stop - start + 1) as usize)
                .cloned()
                .collect())
        })
        .unwrap_or(Ok(Vec::new()))
    }

    // ------------------------------------------------------------------
    // Set operations
    // ------------------------------------------------------------------

    /// Adds `members` to the set at `key`, creating it if absent. Returns
    /// how many members were newly inserted.
    pub fn set_add(&self, key: Bytes, members: Vec<Bytes>) -> TypedResult<usize> {
        let mut map = self.shard(&key).write().unwrap();
        Self::drop_expired(&mut map, &key);

        let entry = map
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        let set = entry.value.as_set_mut().ok_or(WrongType)?;

        Ok(members.into_iter().filter(|m| set.insert(m.clone())).count())
    }

    /// Returns every member of the set at `key` (empty if absent).
    /// Iteration order is unspecified.
    pub fn set_members(&self, key: &[u8]) -> TypedResult<Vec<Bytes>> {
        self.read_entry(key, |entry| {
            entry
                .value
                .as_set()
                .map(|set| set.iter().cloned().collect())
                .ok_or(WrongType)
        })
        .unwrap_or(Ok(Vec::new()))
    }

    /// Tests membership of `member` in the set at `key`.
    pub fn set_is_member(&self, key: &[u8], member: &[u8]) -> TypedResult<bool> {
        self.read_entry(key, |entry| {
            entry
                .value
                .as_set()
                .map(|set| set.contains(member))
                .ok_or(WrongType)
        })
        .unwrap_or(Ok(false))
    }

    // ------------------------------------------------------------------
    // Hash operations
    // ------------------------------------------------------------------

    /// Sets each field/value pair in the hash at `key`, creating it if
    /// absent. Returns how many fields were newly created (an overwritten
    /// field does not count).
    pub fn hash_set(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> TypedResult<usize> {
        let mut map = self.shard(&key).write().unwrap();
        Self::drop_expired(&mut map, &key);

        let entry = map
            .entry(key)
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        let hash = entry.value.as_hash_mut().ok_or(WrongType)?;

        let mut created = 0;
        for (field, value) in pairs {
            if hash.insert(field, value).is_none() {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Returns the value of `field` in the hash at `key`, or `None` if the
    /// key or the field is absent.
    pub fn hash_get(&self, key: &[u8], field: &[u8]) -> TypedResult<Option<Bytes>> {
        self.read_entry(key, |entry| {
            entry
                .value
                .as_hash()
                .map(|hash| hash.get(field).cloned())
                .ok_or(WrongType)
        })
        .unwrap_or(Ok(None))
    }

    /// Returns every field/value pair of the hash at `key` (empty if
    /// absent). Iteration order is unspecified.
    pub fn hash_get_all(&self, key: &[u8]) -> TypedResult<Vec<(Bytes, Bytes)>> {
        self.read_entry(key, |entry| {
            entry
                .value
                .as_hash()
                .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                .ok_or(WrongType)
        })
        .unwrap_or(Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("value"), None);
        assert_eq!(ks.get(b"key").unwrap(), Some(b("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let ks = Keyspace::new();
        assert_eq!(ks.get(b"nope").unwrap(), None);
    }

    #[test]
    fn test_get_wrong_type() {
        let ks = Keyspace::new();
        ks.list_push(b("q"), vec![b("a")], false).unwrap();
        assert_eq!(ks.get(b"q"), Err(WrongType));
    }

    #[test]
    fn test_set_replaces_variant() {
        let ks = Keyspace::new();
        ks.list_push(b("k"), vec![b("a")], false).unwrap();
        assert_eq!(ks.kind(b"k"), Some(ValueKind::List));

        ks.set(b("k"), b("x"), None);
        assert_eq!(ks.kind(b"k"), Some(ValueKind::String));
        assert_eq!(ks.get(b"k").unwrap(), Some(b("x")));
    }

    #[test]
    fn test_delete() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("value"), None);
        assert!(ks.delete(b"key"));
        assert_eq!(ks.get(b"key").unwrap(), None);
        assert!(!ks.delete(b"key"));
    }

    #[test]
    fn test_exists_and_len() {
        let ks = Keyspace::new();
        assert!(!ks.exists(b"key"));
        assert!(ks.is_empty());

        ks.set(b("key"), b("value"), None);
        assert!(ks.exists(b"key"));
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn test_expiry_is_lazy() {
        let ks = Keyspace::new();
        ks.set(b("t"), b("v"), Some(Duration::from_millis(30)));
        assert!(ks.exists(b"t"));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(ks.get(b"t").unwrap(), None);
        assert!(!ks.exists(b"t"));
        assert_eq!(ks.kind(b"t"), None);
        assert_eq!(ks.len(), 0);
    }

    #[test]
    fn test_expired_key_can_change_variant() {
        let ks = Keyspace::new();
        ks.set(b("k"), b("v"), Some(Duration::from_millis(20)));
        std::thread::sleep(Duration::from_millis(50));

        // The stale string entry must not produce a type error.
        assert_eq!(ks.list_push(b("k"), vec![b("a")], false), Ok(1));
        assert_eq!(ks.kind(b"k"), Some(ValueKind::List));
    }

    #[test]
    fn test_cleanup_expired() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), Some(Duration::from_millis(10)));
        ks.set(b("b"), b("2"), Some(Duration::from_millis(10)));
        ks.set(b("c"), b("3"), None);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(ks.cleanup_expired(), 2);
        assert_eq!(ks.len(), 1);
        assert!(ks.exists(b"c"));
    }

    #[test]
    fn test_incr_from_absent() {
        let ks = Keyspace::new();
        assert_eq!(ks.incr_by(b("n"), 1), Ok(1));
        assert_eq!(ks.incr_by(b("n"), 1), Ok(2));
        assert_eq!(ks.incr_by(b("n"), -5), Ok(-3));
        assert_eq!(ks.get(b"n").unwrap(), Some(b("-3")));
    }

    #[test]
    fn test_incr_canonical_form_after_many() {
        let ks = Keyspace::new();
        for _ in 0..250 {
            ks.incr_by(b("n"), 1).unwrap();
        }
        assert_eq!(ks.get(b"n").unwrap(), Some(b("250")));
    }

    #[test]
    fn test_incr_rejects_non_integer() {
        let ks = Keyspace::new();
        ks.set(b("text"), b("hello"), None);
        assert_eq!(ks.incr_by(b("text"), 1), Err(IncrError::NotAnInteger));

        ks.set(b("padded"), b("007"), None);
        assert_eq!(ks.incr_by(b("padded"), 1), Err(IncrError::NotAnInteger));
    }

    #[test]
    fn test_incr_rejects_wrong_type() {
        let ks = Keyspace::new();
        ks.list_push(b("q"), vec![b("a")], false).unwrap();
        assert_eq!(ks.incr_by(b("q"), 1), Err(IncrError::WrongType));
    }

    #[test]
    fn test_incr_overflow_does_not_mutate() {
        let ks = Keyspace::new();
        ks.set(b("n"), Bytes::from(i64::MAX.to_string()), None);
        assert_eq!(ks.incr_by(b("n"), 1), Err(IncrError::Overflow));
        assert_eq!(ks.get(b"n").unwrap(), Some(Bytes::from(i64::MAX.to_string())));
    }

    #[test]
    fn test_incr_preserves_ttl() {
        let ks = Keyspace::new();
        ks.set(b("n"), b("1"), Some(Duration::from_millis(80)));
        ks.incr_by(b("n"), 1).unwrap();
        assert_eq!(ks.get(b"n").unwrap(), Some(b("2")));

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(ks.get(b"n").unwrap(), None);
    }

    #[test]
    fn test_incr_atomic_under_contention() {
        use std::sync::Arc;
        use std::thread;

        let ks = Arc::new(Keyspace::new());
        let threads = 8;
        let per_thread = 200;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let ks = Arc::clone(&ks);
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        ks.incr_by(Bytes::from("counter"), 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected = (threads * per_thread).to_string();
        assert_eq!(ks.get(b"counter").unwrap(), Some(Bytes::from(expected)));
    }

    #[test]
    fn test_list_push_pop() {
        let ks = Keyspace::new();
        assert_eq!(ks.list_push(b("q"), vec![b("a"), b("b")], false), Ok(2));
        assert_eq!(ks.list_push(b("q"), vec![b("c")], true), Ok(3));

        // c pushed at the head: [c, a, b]
        assert_eq!(ks.list_pop(b"q", true).unwrap(), Some(b("c")));
        assert_eq!(ks.list_pop(b"q", false).unwrap(), Some(b("b")));
        assert_eq!(ks.list_pop(b"q", true).unwrap(), Some(b("a")));
        assert_eq!(ks.list_pop(b"q", true).unwrap(), None);
    }

    #[test]
    fn test_lpush_order() {
        let ks = Keyspace::new();
        ks.list_push(b("q"), vec![b("a"), b("b"), b("c")], true).unwrap();
        assert_eq!(
            ks.list_range(b"q", 0, -1).unwrap(),
            vec![b("c"), b("b"), b("a")]
        );
    }

    #[test]
    fn test_empty_list_is_removed() {
        let ks = Keyspace::new();
        ks.list_push(b("q"), vec![b("a")], false).unwrap();
        ks.list_pop(b"q", true).unwrap();

        assert!(!ks.exists(b"q"));
        assert_eq!(ks.kind(b"q"), None);
        // The name is free for another variant now.
        ks.set(b("q"), b("x"), None);
        assert_eq!(ks.kind(b"q"), Some(ValueKind::String));
    }

    #[test]
    fn test_list_len() {
        let ks = Keyspace::new();
        assert_eq!(ks.list_len(b"q"), Ok(0));
        ks.list_push(b("q"), vec![b("a"), b("b"), b("c")], false).unwrap();
        assert_eq!(ks.list_len(b"q"), Ok(3));

        ks.set(b("s"), b("v"), None);
        assert_eq!(ks.list_len(b"s"), Err(WrongType));
    }

    #[test]
    fn test_list_range_semantics() {
        let ks = Keyspace::new();
        ks.list_push(
            b("q"),
            vec![b("a"), b("b"), b("c"), b("d"), b("e")],
            false,
        )
        .unwrap();

        assert_eq!(
            ks.list_range(b"q", 0, -1).unwrap(),
            vec![b("a"), b("b"), b("c"), b("d"), b("e")]
        );
        assert_eq!(ks.list_range(b"q", 1, 3).unwrap(), vec![b("b"), b("c"), b("d")]);
        assert_eq!(ks.list_range(b"q", -3, -1).unwrap(), vec![b("c"), b("d"), b("e")]);
        // Clamped on both ends
        assert_eq!(ks.list_range(b"q", -100, 100).unwrap().len(), 5);
        // Inverted range is empty
        assert_eq!(ks.list_range(b"q", 3, 1).unwrap(), Vec::<Bytes>::new());
        // Absent key is an empty range
        assert_eq!(ks.list_range(b"none", 0, -1).unwrap(), Vec::<Bytes>::new());
    }

    #[test]
    fn test_set_add_dedup() {
        let ks = Keyspace::new();
        assert_eq!(ks.set_add(b("s"), vec![b("x"), b("y"), b("x")]), Ok(2));
        assert_eq!(ks.set_add(b("s"), vec![b("y"), b("z")]), Ok(1));

        let mut members = ks.set_members(b"s").unwrap();
        members.sort();
        assert_eq!(members, vec![b("x"), b("y"), b("z")]);
    }

    #[test]
    fn test_set_is_member() {
        let ks = Keyspace::new();
        ks.set_add(b("s"), vec![b("x")]).unwrap();
        assert_eq!(ks.set_is_member(b"s", b"x"), Ok(true));
        assert_eq!(ks.set_is_member(b"s", b"z"), Ok(false));
        assert_eq!(ks.set_is_member(b"absent", b"x"), Ok(false));

        ks.set(b("str"), b("v"), None);
        assert_eq!(ks.set_is_member(b"str", b"x"), Err(WrongType));
    }

    #[test]
    fn test_hash_set_get() {
        let ks = Keyspace::new();
        assert_eq!(
            ks.hash_set(b("h"), vec![(b("f1"), b("v1")), (b("f2"), b("v2"))]),
            Ok(2)
        );
        // Overwriting an existing field creates nothing
        assert_eq!(ks.hash_set(b("h"), vec![(b("f1"), b("v1b"))]), Ok(0));

        assert_eq!(ks.hash_get(b"h", b"f1").unwrap(), Some(b("v1b")));
        assert_eq!(ks.hash_get(b"h", b"f2").unwrap(), Some(b("v2")));
        assert_eq!(ks.hash_get(b"h", b"missing").unwrap(), None);
        assert_eq!(ks.hash_get(b"absent", b"f").unwrap(), None);
    }

    #[test]
    fn test_hash_get_all() {
        let ks = Keyspace::new();
        ks.hash_set(b("h"), vec![(b("a"), b("1")), (b("b"), b("2"))])
            .unwrap();

        let mut pairs = ks.hash_get_all(b"h").unwrap();
        pairs.sort();
        assert_eq!(pairs, vec![(b("a"), b("1")), (b("b"), b("2"))]);

        assert_eq!(ks.hash_get_all(b"absent").unwrap(), Vec::new());
    }

    #[test]
    fn test_container_type_errors() {
        let ks = Keyspace::new();
        ks.set(b("s"), b("v"), None);

        assert_eq!(ks.list_push(b("s"), vec![b("a")], false), Err(WrongType));
        assert_eq!(ks.list_pop(b"s", true), Err(WrongType));
        assert_eq!(ks.list_range(b"s", 0, -1), Err(WrongType));
        assert_eq!(ks.set_add(b("s"), vec![b("a")]), Err(WrongType));
        assert_eq!(ks.set_members(b"s"), Err(WrongType));
        assert_eq!(ks.hash_set(b("s"), vec![(b("f"), b("v"))]), Err(WrongType));
        assert_eq!(ks.hash_get(b"s", b"f"), Err(WrongType));
        assert_eq!(ks.hash_get_all(b"s"), Err(WrongType));

        // Failed operations mutate nothing
        assert_eq!(ks.kind(b"s"), Some(ValueKind::String));
        assert_eq!(ks.get(b"s").unwrap(), Some(b("v")));
    }

    #[test]
    fn test_keys_pattern() {
        let ks = Keyspace::new();
        ks.set(b("hello"), b("1"), None);
        ks.set(b("hallo"), b("2"), None);
        ks.set(b("hxllo"), b("3"), None);
        ks.set(b("world"), b("4"), None);

        assert_eq!(ks.keys(b"*").len(), 4);
        assert_eq!(ks.keys(b"h*llo").len(), 3);
        assert_eq!(ks.keys(b"h[ae]llo").len(), 2);
        assert_eq!(ks.keys(b"nomatch*x").len(), 0);
    }

    #[test]
    fn test_keys_skips_expired() {
        let ks = Keyspace::new();
        ks.set(b("live"), b("1"), None);
        ks.set(b("dead"), b("2"), Some(Duration::from_millis(10)));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(ks.keys(b"*"), vec![b("live")]);
    }

    #[test]
    fn test_keys_property_matches_glob() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xb1a2e);
        let alphabet = b"ab?*[]-^\\c";

        for _ in 0..200 {
            let ks = Keyspace::new();
            let mut stored: Vec<Bytes> = Vec::new();
            for _ in 0..8 {
                let len = rng.gen_range(0..6);
                let key: Vec<u8> = (0..len)
                    .map(|_| b"abc-"[rng.gen_range(0..4)])
                    .collect();
                let key = Bytes::from(key);
                ks.set(key.clone(), Bytes::from("v"), None);
                if !stored.contains(&key) {
                    stored.push(key);
                }
            }

            let plen = rng.gen_range(0..6);
            let pattern: Vec<u8> = (0..plen)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();

            let matched = ks.keys(&pattern);
            for key in &stored {
                let in_result = matched.contains(key);
                let accepted = glob_match(&pattern, key);
                assert_eq!(
                    in_result, accepted,
                    "pattern {:?} on key {:?}",
                    pattern, key
                );
            }
        }
    }

    #[test]
    fn test_flush_all() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), None);
        ks.list_push(b("q"), vec![b("x")], false).unwrap();
        ks.set_add(b("s"), vec![b("m")]).unwrap();

        ks.flush_all();
        assert!(ks.is_empty());
        assert!(!ks.exists(b"a"));
    }
}
