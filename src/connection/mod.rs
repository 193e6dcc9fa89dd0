//! Connection Module
//!
//! Per-client connection handling. Every accepted socket gets its own
//! async task which exclusively owns the connection's state and drives
//! the read -> parse -> dispatch -> reply loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  TCP listener (main.rs)                  │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │ accept() + spawn
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                   ConnectionHandler                      │
//! │                                                          │
//! │  read bytes ──> parse frame ──> dispatch ──> buffer out  │
//! │       ▲                                          │       │
//! │       └────────── flush batched replies <────────┘       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Replies are batched: a pipelined burst of requests is answered with a
//! handful of socket writes, which is the dominant throughput lever for
//! this server.

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, FLUSH_MAX_BYTES,
    FLUSH_MAX_RESPONSES,
};
