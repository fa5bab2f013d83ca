//! Command Dispatch and Handlers
//!
//! This module turns a decoded argument vector into exactly one RESP reply.
//! The first argument is the command name, matched case-insensitively; the
//! rest are passed to the command's handler, which validates arity and types
//! before touching the keyspace. Each keyspace call is atomic, so a handler
//! never exposes a half-applied mutation.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Request Decoder │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Keyspace     │  (storage module)
//! └─────────────────┘
//! ```
//!
//! An unknown command never mutates state; when a registered name is within
//! edit distance 2 of the typo, the error suggests it.

use crate::protocol::Reply;
use crate::storage::{parse_decimal, IncrError, Keyspace, WrongType};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Every command the server understands, in the order ALAIDE lists them.
const COMMANDS: &[&str] = &[
    "SET", "GET", "DEL", "EXISTS", "TYPE", "INCR", "DECR", "INCRBY", "DECRBY", "LPUSH", "RPUSH",
    "LPOP", "RPOP", "LLEN", "LRANGE", "SADD", "SMEMBERS", "SISMEMBER", "HSET", "HGET", "HGETALL",
    "PING", "ECHO", "KEYS", "DBSIZE", "FLUSHALL", "ALAIDE",
];

const WRONGTYPE_MSG: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER_MSG: &str = "ERR value is not an integer or out of range";

/// Executes commands against a shared keyspace.
#[derive(Clone)]
pub struct CommandHandler {
    keyspace: Arc<Keyspace>,
}

impl CommandHandler {
    pub fn new(keyspace: Arc<Keyspace>) -> Self {
        Self { keyspace }
    }

    /// Executes one request and returns its reply.
    ///
    /// `args` holds the command name followed by its arguments, as decoded
    /// from the wire. The connection loop filters out empty requests before
    /// calling this.
    pub fn execute(&self, args: &[Bytes]) -> Reply {
        let Some((name, rest)) = args.split_first() else {
            return Reply::error("ERR empty command");
        };

        let name = String::from_utf8_lossy(name).to_uppercase();
        self.dispatch(&name, rest)
    }

    fn dispatch(&self, name: &str, args: &[Bytes]) -> Reply {
        match name {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),

            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "KEYS" => self.cmd_keys(args),
            "TYPE" => self.cmd_type(args),

            "INCR" => self.cmd_incr_by(name, args, 1),
            "DECR" => self.cmd_incr_by(name, args, -1),
            "INCRBY" => self.cmd_incr_by_delta(name, args, false),
            "DECRBY" => self.cmd_incr_by_delta(name, args, true),

            "LPUSH" => self.cmd_push(name, args, true),
            "RPUSH" => self.cmd_push(name, args, false),
            "LPOP" => self.cmd_pop(name, args, true),
            "RPOP" => self.cmd_pop(name, args, false),
            "LLEN" => self.cmd_llen(args),
            "LRANGE" => self.cmd_lrange(args),

            "SADD" => self.cmd_sadd(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SISMEMBER" => self.cmd_sismember(args),

            "HSET" => self.cmd_hset(args),
            "HGET" => self.cmd_hget(args),
            "HGETALL" => self.cmd_hgetall(args),

            "DBSIZE" => self.cmd_dbsize(args),
            "FLUSHALL" => self.cmd_flushall(args),
            "ALAIDE" => self.cmd_help(args),

            _ => unknown_command(name),
        }
    }

    // ------------------------------------------------------------------
    // Connection commands
    // ------------------------------------------------------------------

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> Reply {
        match args {
            [] => Reply::pong(),
            [message] => Reply::bulk(message.clone()),
            _ => arity_error("PING"),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> Reply {
        match args {
            [message] => Reply::bulk(message.clone()),
            _ => arity_error("ECHO"),
        }
    }

    // ------------------------------------------------------------------
    // String commands
    // ------------------------------------------------------------------

    /// SET key value [EX seconds]
    fn cmd_set(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return arity_error("SET");
        }

        let key = args[0].clone();
        let value = args[1].clone();

        let mut ttl = None;
        let mut i = 2;
        while i < args.len() {
            let option = String::from_utf8_lossy(&args[i]).to_uppercase();
            match option.as_str() {
                "EX" => {
                    i += 1;
                    let seconds = args.get(i).and_then(|raw| parse_decimal(raw));
                    match seconds {
                        Some(seconds) if seconds > 0 => {
                            ttl = Some(Duration::from_secs(seconds as u64));
                        }
                        _ => return Reply::error("ERR invalid expire time in 'SET' command"),
                    }
                }
                _ => return Reply::error(format!("ERR unknown option '{}' for 'SET'", option)),
            }
            i += 1;
        }

        self.keyspace.set(key, value, ttl);
        Reply::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Reply {
        match args {
            [key] => match self.keyspace.get(key) {
                Ok(Some(value)) => Reply::bulk(value),
                Ok(None) => Reply::null(),
                Err(WrongType) => Reply::error(WRONGTYPE_MSG),
            },
            _ => arity_error("GET"),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return arity_error("DEL");
        }
        Reply::integer(self.keyspace.delete_many(args) as i64)
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return arity_error("EXISTS");
        }
        Reply::integer(self.keyspace.exists_many(args) as i64)
    }

    /// KEYS pattern
    fn cmd_keys(&self, args: &[Bytes]) -> Reply {
        match args {
            [pattern] => Reply::array(self.keyspace.keys(pattern)),
            _ => arity_error("KEYS"),
        }
    }

    /// TYPE key
    fn cmd_type(&self, args: &[Bytes]) -> Reply {
        match args {
            [key] => {
                let name = self
                    .keyspace
                    .kind(key)
                    .map(|kind| kind.as_str())
                    .unwrap_or("none");
                Reply::simple(name)
            }
            _ => arity_error("TYPE"),
        }
    }

    // ------------------------------------------------------------------
    // Numeric commands
    // ------------------------------------------------------------------

    /// INCR key / DECR key
    fn cmd_incr_by(&self, name: &str, args: &[Bytes], delta: i64) -> Reply {
        match args {
            [key] => incr_reply(self.keyspace.incr_by(key.clone(), delta)),
            _ => arity_error(name),
        }
    }

    /// INCRBY key increment / DECRBY key decrement
    fn cmd_incr_by_delta(&self, name: &str, args: &[Bytes], negate: bool) -> Reply {
        let [key, raw_delta] = args else {
            return arity_error(name);
        };

        let Some(delta) = parse_decimal(raw_delta) else {
            return Reply::error(NOT_INTEGER_MSG);
        };
        let delta = if negate {
            match delta.checked_neg() {
                Some(delta) => delta,
                None => return Reply::error("ERR increment or decrement would overflow"),
            }
        } else {
            delta
        };

        incr_reply(self.keyspace.incr_by(key.clone(), delta))
    }

    // ------------------------------------------------------------------
    // List commands
    // ------------------------------------------------------------------

    /// LPUSH key value [value ...] / RPUSH key value [value ...]
    fn cmd_push(&self, name: &str, args: &[Bytes], left: bool) -> Reply {
        let Some((key, items)) = args.split_first() else {
            return arity_error(name);
        };
        if items.is_empty() {
            return arity_error(name);
        }

        match self.keyspace.list_push(key.clone(), items.to_vec(), left) {
            Ok(len) => Reply::integer(len as i64),
            Err(WrongType) => Reply::error(WRONGTYPE_MSG),
        }
    }

    /// LPOP key / RPOP key
    fn cmd_pop(&self, name: &str, args: &[Bytes], left: bool) -> Reply {
        match args {
            [key] => match self.keyspace.list_pop(key, left) {
                Ok(Some(item)) => Reply::bulk(item),
                Ok(None) => Reply::null(),
                Err(WrongType) => Reply::error(WRONGTYPE_MSG),
            },
            _ => arity_error(name),
        }
    }

    /// LLEN key
    fn cmd_llen(&self, args: &[Bytes]) -> Reply {
        match args {
            [key] => match self.keyspace.list_len(key) {
                Ok(len) => Reply::integer(len as i64),
                Err(WrongType) => Reply::error(WRONGTYPE_MSG),
            },
            _ => arity_error("LLEN"),
        }
    }

    /// LRANGE key start stop
    fn cmd_lrange(&self, args: &[Bytes]) -> Reply {
        let [key, raw_start, raw_stop] = args else {
            return arity_error("LRANGE");
        };

        let (Some(start), Some(stop)) = (parse_decimal(raw_start), parse_decimal(raw_stop)) else {
            return Reply::error(NOT_INTEGER_MSG);
        };

        match self.keyspace.list_range(key, start, stop) {
            Ok(items) => Reply::array(items),
            Err(WrongType) => Reply::error(WRONGTYPE_MSG),
        }
    }

    // ------------------------------------------------------------------
    // Set commands
    // ------------------------------------------------------------------

    /// SADD key member [member ...]
    fn cmd_sadd(&self, args: &[Bytes]) -> Reply {
        let Some((key, members)) = args.split_first() else {
            return arity_error("SADD");
        };
        if members.is_empty() {
            return arity_error("SADD");
        }

        match self.keyspace.set_add(key.clone(), members.to_vec()) {
            Ok(added) => Reply::integer(added as i64),
            Err(WrongType) => Reply::error(WRONGTYPE_MSG),
        }
    }

    /// SMEMBERS key
    fn cmd_smembers(&self, args: &[Bytes]) -> Reply {
        match args {
            [key] => match self.keyspace.set_members(key) {
                Ok(members) => Reply::array(members),
                Err(WrongType) => Reply::error(WRONGTYPE_MSG),
            },
            _ => arity_error("SMEMBERS"),
        }
    }

    /// SISMEMBER key member
    fn cmd_sismember(&self, args: &[Bytes]) -> Reply {
        match args {
            [key, member] => match self.keyspace.set_is_member(key, member) {
                Ok(found) => Reply::integer(found as i64),
                Err(WrongType) => Reply::error(WRONGTYPE_MSG),
            },
            _ => arity_error("SISMEMBER"),
        }
    }

    // ------------------------------------------------------------------
    // Hash commands
    // ------------------------------------------------------------------

    /// HSET key field value [field value ...]
    fn cmd_hset(&self, args: &[Bytes]) -> Reply {
        if args.len() < 3 || args.len() % 2 == 0 {
            return arity_error("HSET");
        }

        let key = args[0].clone();
        let pairs = args[1..]
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        match self.keyspace.hash_set(key, pairs) {
            Ok(created) => Reply::integer(created as i64),
            Err(WrongType) => Reply::error(WRONGTYPE_MSG),
        }
    }

    /// HGET key field
    fn cmd_hget(&self, args: &[Bytes]) -> Reply {
        match args {
            [key, field] => match self.keyspace.hash_get(key, field) {
                Ok(Some(value)) => Reply::bulk(value),
                Ok(None) => Reply::null(),
                Err(WrongType) => Reply::error(WRONGTYPE_MSG),
            },
            _ => arity_error("HGET"),
        }
    }

    /// HGETALL key
    fn cmd_hgetall(&self, args: &[Bytes]) -> Reply {
        match args {
            [key] => match self.keyspace.hash_get_all(key) {
                Ok(pairs) => {
                    let mut flat = Vec::with_capacity(pairs.len() * 2);
                    for (field, value) in pairs {
                        flat.push(field);
                        flat.push(value);
                    }
                    Reply::array(flat)
                }
                Err(WrongType) => Reply::error(WRONGTYPE_MSG),
            },
            _ => arity_error("HGETALL"),
        }
    }

    // ------------------------------------------------------------------
    // Server commands
    // ------------------------------------------------------------------

    /// DBSIZE
    fn cmd_dbsize(&self, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return arity_error("DBSIZE");
        }
        Reply::integer(self.keyspace.len() as i64)
    }

    /// FLUSHALL
    fn cmd_flushall(&self, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return arity_error("FLUSHALL");
        }
        self.keyspace.flush_all();
        Reply::ok()
    }

    /// ALAIDE [command]
    fn cmd_help(&self, args: &[Bytes]) -> Reply {
        match args {
            [] => {
                let listing = COMMANDS.join(", ");
                Reply::simple(format!(
                    "ALAIDE: {} - type ALAIDE <command> for details",
                    listing
                ))
            }
            [command] => {
                let name = String::from_utf8_lossy(command).to_uppercase();
                Reply::simple(command_usage(&name))
            }
            _ => arity_error("ALAIDE"),
        }
    }
}

fn arity_error(name: &str) -> Reply {
    Reply::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name
    ))
}

fn incr_reply(result: Result<i64, IncrError>) -> Reply {
    match result {
        Ok(value) => Reply::integer(value),
        Err(IncrError::WrongType) => Reply::error(WRONGTYPE_MSG),
        Err(IncrError::NotAnInteger) => Reply::error(NOT_INTEGER_MSG),
        Err(IncrError::Overflow) => Reply::error("ERR increment or decrement would overflow"),
    }
}

fn unknown_command(name: &str) -> Reply {
    match closest_command(name) {
        Some(candidate) => Reply::error(format!(
            "ERR unknown command '{}', did you mean '{}'?",
            name, candidate
        )),
        None => Reply::error(format!("ERR unknown command '{}'", name)),
    }
}

/// Finds the registered command closest to `name`, if any is within edit
/// distance 2.
fn closest_command(name: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .map(|&candidate| (edit_distance(name, candidate), candidate))
        .min()
        .filter(|&(distance, _)| distance <= 2)
        .map(|(_, candidate)| candidate)
}

/// Levenshtein distance between two ASCII command names.
fn edit_distance(a: &str, b: &str) -> usize {
    let a = a.as_bytes();
    let b = b.as_bytes();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// One-line usage summary for ALAIDE.
fn command_usage(name: &str) -> &'static str {
    match name {
        "SET" => "SET key value [EX seconds] - store a string, optionally expiring after the given seconds",
        "GET" => "GET key - fetch a string value; nil if the key does not exist",
        "DEL" => "DEL key [key ...] - delete keys, returns how many were removed",
        "EXISTS" => "EXISTS key [key ...] - count how many of the given keys exist",
        "TYPE" => "TYPE key - report the value type (string, list, set, hash, zset, none)",
        "INCR" => "INCR key - increment a counter by 1",
        "DECR" => "DECR key - decrement a counter by 1",
        "INCRBY" => "INCRBY key increment - increment a counter by the given amount",
        "DECRBY" => "DECRBY key decrement - decrement a counter by the given amount",
        "LPUSH" => "LPUSH key element [element ...] - push elements onto the head of a list",
        "RPUSH" => "RPUSH key element [element ...] - push elements onto the tail of a list",
        "LPOP" => "LPOP key - pop and return the first element of a list",
        "RPOP" => "RPOP key - pop and return the last element of a list",
        "LLEN" => "LLEN key - return the length of a list",
        "LRANGE" => "LRANGE key start stop - return a slice of a list (-1 is the last element)",
        "SADD" => "SADD key member [member ...] - add unique members to a set",
        "SMEMBERS" => "SMEMBERS key - return every member of a set",
        "SISMEMBER" => "SISMEMBER key member - test set membership (1 or 0)",
        "HSET" => "HSET key field value [field value ...] - set fields in a hash",
        "HGET" => "HGET key field - fetch one field from a hash",
        "HGETALL" => "HGETALL key - return every field and value of a hash",
        "PING" => "PING [message] - connection check; returns PONG or the message",
        "ECHO" => "ECHO message - return the message unchanged",
        "KEYS" => "KEYS pattern - find keys by glob pattern (* any run, ? one byte, [abc] a class)",
        "DBSIZE" => "DBSIZE - return the number of live keys",
        "FLUSHALL" => "FLUSHALL - remove every key",
        "ALAIDE" => "ALAIDE [command] - this help",
        _ => "Unknown command. ALAIDE lists every available command",
    }
}
