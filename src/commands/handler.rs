//! Command Dispatcher
//!
//! Takes one decoded request - the raw frame plus the argument spans the
//! parser produced - validates the command name and arity, runs the
//! operation against the storage engine and appends the reply to the
//! connection's outbound buffer.
//!
//! Command names match case-insensitively. The key is hashed exactly once
//! here and the hash is threaded through every storage call. Argument
//! bytes still live in the connection's inbound buffer at this point; the
//! engine copies whatever it keeps, so nothing here may outlive the call.
//!
//! When the server is configured with a default TTL, SET stores with it
//! and a successful INCR is followed by a `set_expire` refresh - a
//! dispatcher-level composition, not a storage primitive.

use std::sync::Arc;

use crate::protocol::writer;
use crate::protocol::ArgSpan;
use crate::storage::StorageEngine;

/// Executes requests against the shared storage engine.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    /// Default TTL in seconds applied by SET and refreshed by INCR;
    /// 0 disables.
    default_ttl_secs: i64,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>, default_ttl_secs: i64) -> Self {
        Self {
            storage,
            default_ttl_secs,
        }
    }

    /// Runs one request and appends its reply to `out`.
    ///
    /// `frame` is the connection's inbound buffer and `args` the spans of
    /// the request's arguments within it. Returns `true` when the
    /// connection should flush and close (QUIT/EXIT).
    pub fn execute(&self, frame: &[u8], args: &[ArgSpan], out: &mut Vec<u8>) -> bool {
        // An empty request array elicits no reply at all.
        let Some(name_span) = args.first() else {
            return false;
        };
        let name = &frame[name_span.clone()];

        if name.is_empty() {
            writer::append_error(out, "ERR empty command");
            return false;
        }

        if name.eq_ignore_ascii_case(b"GET") {
            self.cmd_get(frame, args, out);
        } else if name.eq_ignore_ascii_case(b"SET") {
            self.cmd_set(frame, args, out);
        } else if name.eq_ignore_ascii_case(b"INCR") {
            self.cmd_incr(frame, args, out);
        } else if name.eq_ignore_ascii_case(b"EXPIRE") {
            self.cmd_expire(frame, args, out);
        } else if name.eq_ignore_ascii_case(b"PING") {
            writer::append_simple(out, "PONG");
        } else if name.eq_ignore_ascii_case(b"CONFIG") {
            self.cmd_config(frame, args, out);
        } else if name.eq_ignore_ascii_case(b"QUIT") || name.eq_ignore_ascii_case(b"EXIT") {
            writer::append_simple(out, "OK");
            return true;
        } else {
            writer::append_error(
                out,
                &format!("ERR unknown command '{}'", String::from_utf8_lossy(name)),
            );
        }
        false
    }

    fn cmd_set(&self, frame: &[u8], args: &[ArgSpan], out: &mut Vec<u8>) {
        if args.len() < 3 {
            append_arity_error(out, "SET");
            return;
        }
        let key = &frame[args[1].clone()];
        let value = &frame[args[2].clone()];
        let hash = self.storage.hash_key(key);

        if self.default_ttl_secs > 0 {
            self.storage
                .set_with_ttl(hash, key, value, self.default_ttl_secs);
        } else {
            self.storage.set(hash, key, value);
        }
        writer::append_simple(out, "OK");
    }

    fn cmd_get(&self, frame: &[u8], args: &[ArgSpan], out: &mut Vec<u8>) {
        if args.len() < 2 {
            append_arity_error(out, "GET");
            return;
        }
        let key = &frame[args[1].clone()];
        let hash = self.storage.hash_key(key);

        match self.storage.get(hash, key) {
            Some(value) => writer::append_bulk(out, &value),
            None => writer::append_null_bulk(out),
        }
    }

    fn cmd_incr(&self, frame: &[u8], args: &[ArgSpan], out: &mut Vec<u8>) {
        if args.len() < 2 {
            append_arity_error(out, "INCR");
            return;
        }
        let key = &frame[args[1].clone()];
        let hash = self.storage.hash_key(key);

        match self.storage.incr(hash, key) {
            Ok(value) => {
                if self.default_ttl_secs > 0 {
                    let _ = self.storage.set_expire(hash, key, self.default_ttl_secs);
                }
                writer::append_int(out, value);
            }
            Err(err) => writer::append_error(out, &err.to_string()),
        }
    }

    fn cmd_expire(&self, frame: &[u8], args: &[ArgSpan], out: &mut Vec<u8>) {
        if args.len() < 3 {
            append_arity_error(out, "EXPIRE");
            return;
        }
        let key = &frame[args[1].clone()];
        let seconds = std::str::from_utf8(&frame[args[2].clone()])
            .ok()
            .and_then(|s| s.parse::<i64>().ok());

        match seconds {
            None => writer::append_error(out, "ERR value is not an integer or out of range"),
            Some(seconds) => {
                let hash = self.storage.hash_key(key);
                let applied = self.storage.set_expire(hash, key, seconds);
                writer::append_int(out, i64::from(applied));
            }
        }
    }

    fn cmd_config(&self, frame: &[u8], args: &[ArgSpan], out: &mut Vec<u8>) {
        // Only the CONFIG GET probe is supported, answered with an empty
        // array so probing clients keep working.
        let is_get = args
            .get(1)
            .is_some_and(|span| frame[span.clone()].eq_ignore_ascii_case(b"GET"));
        if is_get {
            writer::append_empty_array(out);
        } else {
            append_arity_error(out, "CONFIG");
        }
    }
}

fn append_arity_error(out: &mut Vec<u8>, command: &str) {
    writer::append_error(
        out,
        &format!("ERR wrong number of arguments for '{command}' command"),
    );
}
