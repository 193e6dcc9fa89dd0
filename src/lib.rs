//! # SwiftKV - A Pipelined In-Memory Key-Value Server
//!
//! SwiftKV is an in-memory key-value server speaking a subset of the RESP
//! protocol. It is built for pipelined workloads: clients send bursts of
//! requests over persistent connections and the server answers every one
//! of them, in order, with batched socket writes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            SwiftKV                               │
//! │                                                                  │
//! │  ┌────────────┐    ┌──────────────┐    ┌────────────────┐        │
//! │  │ TCP        │───>│ Connection   │───>│ Command        │        │
//! │  │ listener   │    │ driver       │    │ dispatcher     │        │
//! │  └────────────┘    └──────┬───────┘    └───────┬────────┘        │
//! │                           │                    │                 │
//! │                    ┌──────▼───────┐    ┌───────▼────────┐        │
//! │                    │ RESP framer/ │    │ StorageEngine  │        │
//! │                    │ serializer   │    │ (64 shards,    │        │
//! │                    └──────────────┘    │  RwLock each)  │        │
//! │                                        └───────▲────────┘        │
//! │                                                │                 │
//! │                                   ┌────────────┴────────────┐    │
//! │                                   │         Janitor         │    │
//! │                                   │ (background tokio task) │    │
//! │                                   └─────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Commands
//!
//! `SET key value`, `GET key`, `INCR key`, `EXPIRE key seconds`, `PING`,
//! `CONFIG GET ...` (stub), `QUIT`/`EXIT`.
//!
//! ## Design Highlights
//!
//! - **One hash per command.** The key bytes are hashed once; the 64-bit
//!   hash selects the shard and keys the bucket, and collisions are
//!   resolved by a short inline chain.
//! - **Zero-copy framing.** The parser hands out byte ranges into the
//!   connection's inbound buffer; owned copies are made only when bytes
//!   enter the store.
//! - **Batched replies.** The driver flushes when the pipeline drains, at
//!   64 KiB of output, or after 4096 buffered replies - thousands of
//!   pipelined requests cost a handful of write syscalls.
//! - **Lazy + active expiration.** Expired keys are reaped on access and
//!   by a scan-limited background janitor.
//! - **Entry recycling.** Deleted entries return to a shared free list,
//!   keeping allocator pressure flat under key churn.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use storage::{start_janitor, Janitor, JanitorConfig, StorageEngine};

/// The default port SwiftKV listens on (same as Redis).
pub const DEFAULT_PORT: u16 = 6379;

/// The default host SwiftKV binds to.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of SwiftKV.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
