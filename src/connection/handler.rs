//! Connection Driver
//!
//! One task per client connection, owning all of its state: the inbound
//! buffer, the reusable argument scratch, the outbound reply buffer and
//! the close flag. The loop reads whatever the socket has, decodes and
//! dispatches every complete request in the buffer, and batches the
//! replies so a pipelined burst costs a handful of write syscalls rather
//! than one per reply.
//!
//! ## Flush Policy
//!
//! The outbound buffer is written to the socket when any of these holds:
//!
//! - the inbound buffer has been fully consumed (the pipeline drained)
//! - the outbound buffer reached [`FLUSH_MAX_BYTES`]
//! - [`FLUSH_MAX_RESPONSES`] replies are buffered
//!
//! ## Lifecycle
//!
//! Reading -> parsing -> dispatching -> replying, looping until QUIT, a
//! malformed frame (one generic error is written, then the connection
//! closes) or a socket error (the connection is dropped, along with any
//! undelivered replies). Replies always leave in arrival order.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, trace, warn};

use crate::commands::CommandHandler;
use crate::protocol::parser::{self, ParseError, MAX_BULK_SIZE};
use crate::protocol::{writer, ArgSpan};

/// Flush once the outbound buffer reaches this many bytes.
pub const FLUSH_MAX_BYTES: usize = 64 * 1024;

/// Flush once this many replies are buffered.
pub const FLUSH_MAX_RESPONSES: usize = 4096;

/// Initial inbound buffer capacity.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// A connection whose buffered bytes exceed this without forming a
/// complete request is dropped.
const MAX_REQUEST_SIZE: usize = MAX_BULK_SIZE + 16 * 1024;

/// Server-wide connection counters, shared across all handler tasks.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted.
    pub connections_accepted: AtomicU64,
    /// Currently active connections.
    pub active_connections: AtomicU64,
    /// Total commands processed.
    pub commands_processed: AtomicU64,
    /// Total bytes read.
    pub bytes_read: AtomicU64,
    /// Total bytes written.
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent bytes that cannot frame a request.
    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),

    /// The client closed the connection between requests.
    #[error("client disconnected")]
    ClientDisconnected,

    /// The client closed the connection mid-request.
    #[error("connection closed mid-request")]
    UnexpectedEof,

    /// The buffered input grew past the maximum request size without
    /// completing a frame.
    #[error("request exceeds the maximum size")]
    RequestTooLarge,
}

/// State machine for one client connection.
pub struct ConnectionHandler {
    stream: TcpStream,
    addr: SocketAddr,

    /// Inbound bytes; complete frames are consumed from the front.
    buffer: BytesMut,

    /// Argument-span scratch, reused for every request.
    args: Vec<ArgSpan>,

    /// Outbound replies accumulated since the last flush.
    out: Vec<u8>,

    /// Replies buffered since the last flush.
    responses_buffered: usize,

    /// Set by QUIT/EXIT; the residual buffer is flushed, then the socket
    /// closes.
    should_close: bool,

    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream,
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            args: Vec::with_capacity(8),
            out: Vec::with_capacity(FLUSH_MAX_BYTES),
            responses_buffered: 0,
            should_close: false,
            commands,
            stats,
        }
    }

    /// Drives the connection until it closes.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "client disconnected"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "client disconnected")
            }
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.drain_requests().await?;

            if self.should_close {
                self.flush().await?;
                return Ok(());
            }

            self.read_more().await?;
        }
    }

    /// Parses and dispatches every complete request currently buffered,
    /// flushing according to the batching policy.
    async fn drain_requests(&mut self) -> Result<(), ConnectionError> {
        loop {
            if self.buffer.is_empty() {
                return Ok(());
            }

            let consumed = match parser::parse_request(&self.buffer, &mut self.args) {
                Ok(Some(consumed)) => consumed,
                Ok(None) => return Ok(()),
                Err(e) => {
                    // One generic error reply, then the connection is done.
                    warn!(client = %self.addr, error = %e, "malformed request");
                    writer::append_error(&mut self.out, "ERR invalid command format");
                    let _ = self.flush().await;
                    return Err(e.into());
                }
            };

            let close = self.commands.execute(&self.buffer, &self.args, &mut self.out);
            self.buffer.advance(consumed);
            self.responses_buffered += 1;
            self.stats.command_processed();

            if close {
                // Frames pipelined after QUIT are dropped.
                self.should_close = true;
                return Ok(());
            }

            if self.buffer.is_empty()
                || self.out.len() >= FLUSH_MAX_BYTES
                || self.responses_buffered >= FLUSH_MAX_RESPONSES
            {
                self.flush().await?;
            }
        }
    }

    async fn read_more(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_REQUEST_SIZE {
            error!(
                client = %self.addr,
                buffered = self.buffer.len(),
                "request exceeds maximum size"
            );
            return Err(ConnectionError::RequestTooLarge);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.read_buf(&mut self.buffer).await?;
        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            }
            return Err(ConnectionError::UnexpectedEof);
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "read");
        Ok(())
    }

    /// Writes the outbound buffer to the socket and resets the batch
    /// counters.
    async fn flush(&mut self) -> Result<(), ConnectionError> {
        self.responses_buffered = 0;
        if self.out.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.out).await?;
        self.stats.bytes_written(self.out.len());
        trace!(client = %self.addr, bytes = self.out.len(), "flushed replies");
        self.out.clear();
        Ok(())
    }
}

/// Creates a handler for one accepted connection and runs it to
/// completion, logging anything other than an ordinary disconnect.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, commands, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "connection ended with error");
            }
        }
    }
}
