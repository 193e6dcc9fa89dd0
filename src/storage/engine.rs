//! Sharded Storage Engine
//!
//! The store is partitioned into a fixed, power-of-two number of shards.
//! Every operation takes a precomputed 64-bit hash of the key: the low bits
//! select the shard and the full hash keys the shard's bucket map, so the
//! key bytes are hashed exactly once per command. Buckets hold collision
//! chains - each entry carries its successor inline - and a read hit
//! compares one `u64` for the bucket plus the key bytes of a
//! usually-length-one chain.
//!
//! ## Concurrency Model
//!
//! One `RwLock` per shard: many readers or one writer. The read path copies
//! the value out before releasing the lock; callers never hold references
//! into a shard. When a read finds an expired entry it upgrades by
//! releasing the read lock, taking the write lock and re-checking, because
//! another writer may have deleted or refreshed the entry in the gap.
//!
//! ## Expiration
//!
//! Entries expire lazily on access (`get`/`incr`) and in the background via
//! [`sweep_expired`](StorageEngine::sweep_expired), which the janitor task
//! calls on a fixed period with a bounded scan budget. Lazy reaping is the
//! authoritative path; the sweep only bounds the lifetime of keys that are
//! never touched again.
//!
//! ## Entry Recycling
//!
//! Deleted and expired entries are cleared and pushed onto a free list
//! shared by all shards. Creating an entry pops from the free list first
//! and only allocates on a miss, which keeps allocator pressure flat under
//! key-churning workloads. Entries are recycled only while the owning
//! shard's write lock is held, so no reader can still observe their bytes.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ahash::{AHasher, RandomState};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::protocol::writer::append_decimal;

/// Default number of shards. More shards mean less lock contention at a
/// small fixed memory cost; must be a power of two.
pub const DEFAULT_SHARD_COUNT: usize = 64;

/// INCR was applied to a value that does not hold a signed 64-bit integer
/// (or the increment would overflow one).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("ERR value is not an integer or out of range")]
pub struct NotInteger;

/// One live key: owned key and value bytes, an optional absolute deadline,
/// and the inline link to the next entry sharing the same bucket hash.
struct Entry {
    key: Vec<u8>,
    value: Vec<u8>,
    expire_at: Option<Instant>,
    next: Option<Box<Entry>>,
}

impl Entry {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }
}

/// Bucket map: full key hash to collision chain head. The keys are already
/// well-mixed 64-bit hashes, so the map itself uses the cheap integer path
/// of `AHasher` rather than re-hashing the key bytes.
type BucketMap = HashMap<u64, Box<Entry>, BuildHasherDefault<AHasher>>;

struct Shard {
    entries: RwLock<BucketMap>,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: RwLock::new(BucketMap::default()),
        }
    }
}

/// Free list of cleared entries, shared across shards.
#[derive(Default)]
struct EntryPool {
    free: Mutex<Vec<Box<Entry>>>,
}

impl EntryPool {
    /// Pops a recycled entry and refills it, or allocates on a miss.
    fn acquire(&self, key: &[u8], value: &[u8], expire_at: Option<Instant>) -> Box<Entry> {
        match self.free.lock().pop() {
            Some(mut entry) => {
                entry.key.extend_from_slice(key);
                entry.value.extend_from_slice(value);
                entry.expire_at = expire_at;
                entry
            }
            None => Box::new(Entry {
                key: key.to_vec(),
                value: value.to_vec(),
                expire_at,
                next: None,
            }),
        }
    }

    /// Clears a detached entry and returns it to the free list. Must be
    /// called while the owning shard's write lock is held, so no reader
    /// can still be borrowing the entry's bytes.
    fn release(&self, mut entry: Box<Entry>) {
        entry.key.clear();
        entry.value.clear();
        entry.expire_at = None;
        entry.next = None;
        self.free.lock().push(entry);
    }
}

/// Storage-level statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Number of live keys (approximate under concurrency).
    pub keys: u64,
    /// Total entries reaped because their deadline passed.
    pub expired: u64,
}

/// The sharded key-value store shared by all connections.
///
/// Designed to be wrapped in an `Arc`; every operation takes `&self`.
///
/// # Example
///
/// ```
/// use swiftkv::storage::StorageEngine;
///
/// let engine = StorageEngine::new();
/// let hash = engine.hash_key(b"name");
/// engine.set(hash, b"name", b"Mara");
/// assert_eq!(engine.get(hash, b"name").as_deref(), Some(&b"Mara"[..]));
/// ```
pub struct StorageEngine {
    shards: Box<[Shard]>,
    shard_mask: u64,
    hasher: RandomState,
    pool: EntryPool,
    key_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("keys", &self.key_count.load(Ordering::Relaxed))
            .field("expired", &self.expired_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an engine with [`DEFAULT_SHARD_COUNT`] shards.
    pub fn new() -> Self {
        Self::with_shard_count(DEFAULT_SHARD_COUNT)
    }

    /// Creates an engine with `shard_count` shards.
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is not a power of two.
    pub fn with_shard_count(shard_count: usize) -> Self {
        assert!(
            shard_count.is_power_of_two(),
            "shard count must be a power of two, got {shard_count}"
        );
        let shards: Box<[Shard]> = (0..shard_count).map(|_| Shard::new()).collect();

        Self {
            shards,
            shard_mask: (shard_count - 1) as u64,
            hasher: RandomState::new(),
            pool: EntryPool::default(),
            key_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Hashes key bytes once; the result is passed to every operation.
    #[inline]
    pub fn hash_key(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    #[inline]
    fn shard(&self, hash: u64) -> &Shard {
        &self.shards[(hash & self.shard_mask) as usize]
    }

    /// Stores `value` under `key` with no expiration, overwriting any
    /// previous value and clearing any previous deadline.
    pub fn set(&self, hash: u64, key: &[u8], value: &[u8]) {
        self.set_at(hash, key, value, None);
    }

    /// As [`set`](Self::set), but with `ttl_seconds > 0` the entry expires
    /// `ttl_seconds` from now. A non-positive TTL stores without
    /// expiration.
    pub fn set_with_ttl(&self, hash: u64, key: &[u8], value: &[u8], ttl_seconds: i64) {
        self.set_at(hash, key, value, deadline_after(ttl_seconds));
    }

    fn set_at(&self, hash: u64, key: &[u8], value: &[u8], expire_at: Option<Instant>) {
        let shard = self.shard(hash);
        let mut map = shard.entries.write();

        if let Some(head) = map.get_mut(&hash) {
            if let Some(entry) = find_mut(head, key) {
                entry.value.clear();
                entry.value.extend_from_slice(value);
                entry.expire_at = expire_at;
                return;
            }
        }

        let fresh = self.pool.acquire(key, value, expire_at);
        link_front(&mut map, hash, fresh);
        self.key_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns an owned copy of the live value for `key`, or `None` when
    /// the key is missing or expired. An expired entry is reaped on the
    /// way out; the two cases are indistinguishable to the caller.
    pub fn get(&self, hash: u64, key: &[u8]) -> Option<Bytes> {
        let shard = self.shard(hash);
        let now = Instant::now();

        {
            let map = shard.entries.read();
            match map.get(&hash).and_then(|head| find(head, key)) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => {
                    return Some(Bytes::copy_from_slice(&entry.value));
                }
                Some(_) => {}
            }
        }

        // Expired under the read lock. Upgrade by reacquiring and
        // re-check: a writer may have deleted or refreshed the entry
        // between the two critical sections.
        let mut map = shard.entries.write();
        let entry = match map.get(&hash).and_then(|head| find(head, key)) {
            Some(entry) => entry,
            None => return None,
        };
        if entry.is_expired(now) {
            if let Some(dead) = remove_key(&mut map, hash, key) {
                self.pool.release(dead);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
            }
            return None;
        }
        Some(Bytes::copy_from_slice(&entry.value))
    }

    /// Atomically increments the integer stored at `key`, installing `"1"`
    /// when the key is missing. The new digits are written into the
    /// entry's value in place.
    pub fn incr(&self, hash: u64, key: &[u8]) -> Result<i64, NotInteger> {
        let shard = self.shard(hash);
        let now = Instant::now();
        let mut map = shard.entries.write();

        let reap = map
            .get(&hash)
            .and_then(|head| find(head, key))
            .is_some_and(|entry| entry.is_expired(now));
        if reap {
            if let Some(dead) = remove_key(&mut map, hash, key) {
                self.pool.release(dead);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(head) = map.get_mut(&hash) {
            if let Some(entry) = find_mut(head, key) {
                let current = parse_i64(&entry.value).ok_or(NotInteger)?;
                let next = current.checked_add(1).ok_or(NotInteger)?;
                entry.value.clear();
                append_decimal(&mut entry.value, next);
                return Ok(next);
            }
        }

        let fresh = self.pool.acquire(key, b"1", None);
        link_front(&mut map, hash, fresh);
        self.key_count.fetch_add(1, Ordering::Relaxed);
        Ok(1)
    }

    /// Sets or clears the deadline for `key`. Returns `false` when the key
    /// is absent. `seconds <= 0` deletes the entry and returns `true`;
    /// otherwise the deadline becomes `now + seconds`.
    pub fn set_expire(&self, hash: u64, key: &[u8], seconds: i64) -> bool {
        let shard = self.shard(hash);
        let mut map = shard.entries.write();

        if seconds <= 0 {
            match remove_key(&mut map, hash, key) {
                Some(dead) => {
                    self.pool.release(dead);
                    self.key_count.fetch_sub(1, Ordering::Relaxed);
                    true
                }
                None => false,
            }
        } else {
            match map.get_mut(&hash).and_then(|head| find_mut(head, key)) {
                Some(entry) => {
                    entry.expire_at = Some(Instant::now() + Duration::from_secs(seconds as u64));
                    true
                }
                None => false,
            }
        }
    }

    /// Reaps expired entries across all shards in order, scanning at most
    /// `scan_limit` entries per shard - extended to ten times that while
    /// removals keep turning up, to clear a hot pocket. Returns the number
    /// of entries reaped.
    ///
    /// Sampling is non-positional: the bucket iteration order is arbitrary
    /// and may differ between calls. Correctness never depends on a sweep
    /// visiting everything; lazy reaping on access remains authoritative.
    pub fn sweep_expired(&self, scan_limit: usize) -> u64 {
        let now = Instant::now();
        let max_scan = if scan_limit < 1000 {
            scan_limit * 10
        } else {
            scan_limit
        };
        // Bucket scratch is filled under the lock but allocated out here.
        let mut buckets: Vec<u64> = Vec::with_capacity(max_scan);
        let mut removed_total = 0u64;

        for shard in self.shards.iter() {
            let mut map = shard.entries.write();
            removed_total += sweep_shard(&mut map, now, scan_limit, max_scan, &self.pool, &mut buckets);
        }

        if removed_total > 0 {
            self.key_count.fetch_sub(removed_total, Ordering::Relaxed);
            self.expired_count.fetch_add(removed_total, Ordering::Relaxed);
        }
        removed_total
    }

    /// Approximate number of live keys.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Returns true when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

fn deadline_after(seconds: i64) -> Option<Instant> {
    (seconds > 0).then(|| Instant::now() + Duration::from_secs(seconds as u64))
}

fn parse_i64(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value).ok()?.parse::<i64>().ok()
}

/// Links `fresh` at the head of the bucket chain for `hash`.
fn link_front(map: &mut BucketMap, hash: u64, mut fresh: Box<Entry>) {
    if let Some(head) = map.remove(&hash) {
        fresh.next = Some(head);
    }
    map.insert(hash, fresh);
}

/// Walks a chain for an exact key match.
fn find<'a>(mut cur: &'a Entry, key: &[u8]) -> Option<&'a Entry> {
    loop {
        if cur.key.as_slice() == key {
            return Some(cur);
        }
        cur = cur.next.as_deref()?;
    }
}

fn find_mut<'a>(mut cur: &'a mut Entry, key: &[u8]) -> Option<&'a mut Entry> {
    loop {
        if cur.key.as_slice() == key {
            return Some(cur);
        }
        cur = cur.next.as_deref_mut()?;
    }
}

/// Detaches the entry for `key` from its bucket. A bucket key stays in
/// the map only while its chain is non-empty. The caller owns the
/// returned entry and is responsible for recycling it.
fn remove_key(map: &mut BucketMap, hash: u64, key: &[u8]) -> Option<Box<Entry>> {
    let head_matches = map.get(&hash)?.key.as_slice() == key;
    if head_matches {
        let mut removed = map.remove(&hash)?;
        if let Some(rest) = removed.next.take() {
            map.insert(hash, rest);
        }
        return Some(removed);
    }
    let head = map.get_mut(&hash)?;
    unlink_after(head, key)
}

/// Detaches a non-head chain entry matching `key`.
fn unlink_after(head: &mut Entry, key: &[u8]) -> Option<Box<Entry>> {
    let mut cur = head;
    loop {
        let next_matches = match cur.next.as_deref() {
            Some(next) => next.key.as_slice() == key,
            None => return None,
        };
        if next_matches {
            let mut removed = cur.next.take()?;
            cur.next = removed.next.take();
            return Some(removed);
        }
        cur = cur.next.as_deref_mut()?;
    }
}

/// One shard's share of a sweep tick. Pre-collects up to `max_scan` bucket
/// hashes into `scratch`, then walks each chain dropping expired cells.
/// Stops early once `scan_limit` entries were examined without a single
/// removal, and unconditionally at `max_scan`.
fn sweep_shard(
    map: &mut BucketMap,
    now: Instant,
    scan_limit: usize,
    max_scan: usize,
    pool: &EntryPool,
    scratch: &mut Vec<u64>,
) -> u64 {
    scratch.clear();
    scratch.extend(map.keys().copied().take(max_scan));

    let mut scanned = 0usize;
    let mut removed = 0u64;

    for &hash in scratch.iter() {
        let Some(head) = map.remove(&hash) else {
            continue;
        };
        let mut chain = Some(head);
        let mut budget_hit = false;

        {
            let mut cur = &mut chain;
            loop {
                let expired = match cur.as_deref() {
                    Some(entry) => entry.is_expired(now),
                    None => break,
                };
                if expired {
                    let Some(mut dead) = cur.take() else { break };
                    *cur = dead.next.take();
                    pool.release(dead);
                    removed += 1;
                } else {
                    let Some(entry) = cur.as_deref_mut() else { break };
                    cur = &mut entry.next;
                }
                scanned += 1;
                if (scanned >= scan_limit && removed == 0) || scanned >= max_scan {
                    budget_hit = true;
                    break;
                }
            }
        }

        if let Some(head) = chain {
            map.insert(hash, head);
        }
        if budget_hit {
            break;
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed<'a>(engine: &StorageEngine, key: &'a [u8]) -> (u64, &'a [u8]) {
        (engine.hash_key(key), key)
    }

    #[test]
    fn set_and_get() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set(h, k, b"value");
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"value"[..]));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn get_missing() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"nope");
        assert_eq!(engine.get(h, k), None);
    }

    #[test]
    fn set_is_idempotent_and_overwrites() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set(h, k, b"one");
        engine.set(h, k, b"two");
        engine.set(h, k, b"two");
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"two"[..]));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn binary_values_round_trip() {
        let engine = StorageEngine::new();
        let value: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let (h, k) = hashed(&engine, b"\x00bin\xffkey");

        engine.set(h, k, &value);
        assert_eq!(engine.get(h, k).as_deref(), Some(value.as_slice()));
    }

    #[test]
    fn overwrite_clears_expiration() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set_at(h, k, b"old", Some(Instant::now() + Duration::from_millis(30)));
        engine.set(h, k, b"new");
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn expired_entry_is_reaped_on_get() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set_at(h, k, b"value", Some(Instant::now() + Duration::from_millis(30)));
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"value"[..]));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(engine.get(h, k), None);
        assert_eq!(engine.len(), 0);
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn set_with_ttl_non_positive_means_no_expiration() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set_with_ttl(h, k, b"value", 0);
        engine.set_with_ttl(h, k, b"value", -5);
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"value"[..]));
    }

    #[test]
    fn incr_from_missing_counts_up() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"counter");

        for expected in 1..=5 {
            assert_eq!(engine.incr(h, k), Ok(expected));
        }
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"5"[..]));
    }

    #[test]
    fn incr_on_existing_number() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"counter");

        engine.set(h, k, b"3");
        assert_eq!(engine.incr(h, k), Ok(4));
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"4"[..]));
    }

    #[test]
    fn incr_on_negative_number() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"counter");

        engine.set(h, k, b"-3");
        assert_eq!(engine.incr(h, k), Ok(-2));
    }

    #[test]
    fn incr_on_non_integer_fails_and_preserves_value() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set(h, k, b"abc");
        assert_eq!(engine.incr(h, k), Err(NotInteger));
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn incr_overflow_fails_and_preserves_value() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        let max = i64::MAX.to_string();
        engine.set(h, k, max.as_bytes());
        assert_eq!(engine.incr(h, k), Err(NotInteger));
        assert_eq!(engine.get(h, k).as_deref(), Some(max.as_bytes()));
    }

    #[test]
    fn incr_after_expiry_restarts_from_one() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"counter");

        engine.set_at(h, k, b"41", Some(Instant::now() + Duration::from_millis(30)));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(engine.incr(h, k), Ok(1));
    }

    #[test]
    fn set_expire_on_missing_key() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"nope");
        assert!(!engine.set_expire(h, k, 10));
        assert!(!engine.set_expire(h, k, 0));
    }

    #[test]
    fn set_expire_non_positive_deletes() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set(h, k, b"value");
        assert!(engine.set_expire(h, k, 0));
        assert_eq!(engine.get(h, k), None);
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn set_expire_applies_a_deadline() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set(h, k, b"value");
        assert!(engine.set_expire(h, k, 1));
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"value"[..]));

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(engine.get(h, k), None);
    }

    #[test]
    fn collision_chains_keep_keys_separate() {
        let engine = StorageEngine::with_shard_count(4);
        // Operations take the hash from the caller, so forcing two keys
        // onto one bucket is just passing the same hash twice.
        let hash = 0xDEAD_BEEF;

        engine.set(hash, b"alpha", b"1");
        engine.set(hash, b"beta", b"2");
        engine.set(hash, b"gamma", b"3");
        assert_eq!(engine.len(), 3);
        assert_eq!(engine.get(hash, b"alpha").as_deref(), Some(&b"1"[..]));
        assert_eq!(engine.get(hash, b"beta").as_deref(), Some(&b"2"[..]));
        assert_eq!(engine.get(hash, b"gamma").as_deref(), Some(&b"3"[..]));

        // Remove the middle of the chain, then the head.
        assert!(engine.set_expire(hash, b"beta", 0));
        assert_eq!(engine.get(hash, b"beta"), None);
        assert_eq!(engine.get(hash, b"alpha").as_deref(), Some(&b"1"[..]));
        assert_eq!(engine.get(hash, b"gamma").as_deref(), Some(&b"3"[..]));

        assert!(engine.set_expire(hash, b"gamma", 0));
        assert!(engine.set_expire(hash, b"alpha", 0));
        assert_eq!(engine.len(), 0);
        // The bucket itself must be gone once its chain emptied.
        assert!(!engine.shard(hash).entries.read().contains_key(&hash));
    }

    #[test]
    fn deleted_entries_are_recycled() {
        let engine = StorageEngine::new();
        let (h, k) = hashed(&engine, b"key");

        engine.set(h, k, b"value");
        assert!(engine.set_expire(h, k, 0));
        assert_eq!(engine.pool.free.lock().len(), 1);

        let (h2, k2) = hashed(&engine, b"other");
        engine.set(h2, k2, b"value");
        assert_eq!(engine.pool.free.lock().len(), 0);
        assert_eq!(engine.get(h2, k2).as_deref(), Some(&b"value"[..]));
    }

    #[test]
    fn sweep_reaps_expired_entries() {
        let engine = StorageEngine::new();
        let past = Some(Instant::now() - Duration::from_millis(1));

        for i in 0..50u32 {
            let key = format!("dead:{i}");
            let h = engine.hash_key(key.as_bytes());
            engine.set_at(h, key.as_bytes(), b"x", past);
        }
        let (h, k) = hashed(&engine, b"alive");
        engine.set(h, k, b"x");

        let removed = engine.sweep_expired(100);
        assert_eq!(removed, 50);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get(h, k).as_deref(), Some(&b"x"[..]));
    }

    #[test]
    fn sweep_respects_scan_budget_without_removals() {
        let engine = StorageEngine::with_shard_count(1);
        for i in 0..500u32 {
            let key = format!("live:{i}");
            let h = engine.hash_key(key.as_bytes());
            engine.set(h, key.as_bytes(), b"x");
        }

        // Nothing is expired, so the sweep must give up after the base
        // scan budget instead of walking all 500 entries.
        assert_eq!(engine.sweep_expired(100), 0);
        assert_eq!(engine.len(), 500);
    }

    #[test]
    fn concurrent_increments_are_atomic() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        let threads = 8;
        let per_thread = 1000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let h = engine.hash_key(b"shared");
                    for _ in 0..per_thread {
                        engine.incr(h, b"shared").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let h = engine.hash_key(b"shared");
        let expected = (threads * per_thread).to_string();
        assert_eq!(engine.get(h, b"shared").as_deref(), Some(expected.as_bytes()));
    }

    #[test]
    fn concurrent_mixed_workload() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("key-{t}-{i}");
                        let h = engine.hash_key(key.as_bytes());
                        engine.set(h, key.as_bytes(), b"value");
                        assert!(engine.get(h, key.as_bytes()).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 4000);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn shard_count_must_be_power_of_two() {
        let _ = StorageEngine::with_shard_count(48);
    }
}
