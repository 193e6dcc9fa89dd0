//! Storage Engine Module
//!
//! The shared, sharded key-value store and its background janitor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ ...64   │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  │ chains  │ │ chains  │ │ chains  │ │         │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! │        └──────── shared entry free list ────────┘          │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ periodic scan-limited sweeps
//!              ┌─────────────┴─────────────┐
//!              │          Janitor          │
//!              │  (background tokio task)  │
//!              └───────────────────────────┘
//! ```
//!
//! Every operation takes a precomputed 64-bit key hash so the key bytes
//! are hashed once per command; the hash selects the shard and keys the
//! bucket. Expired entries are reaped lazily on access and periodically by
//! the janitor.
//!
//! ## Example
//!
//! ```
//! use swiftkv::storage::StorageEngine;
//!
//! let engine = StorageEngine::new();
//! let hash = engine.hash_key(b"session");
//!
//! engine.set_with_ttl(hash, b"session", b"token123", 3600);
//! assert!(engine.get(hash, b"session").is_some());
//!
//! assert_eq!(engine.incr(engine.hash_key(b"hits"), b"hits"), Ok(1));
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{NotInteger, StorageEngine, StorageStats, DEFAULT_SHARD_COUNT};
pub use expiry::{start_janitor, Janitor, JanitorConfig};
