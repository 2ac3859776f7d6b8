//! Connection Handler
//!
//! Each accepted client gets its own handler task running this loop:
//!
//! ```text
//!    ┌──────────────────────────────────────────┐
//!    │  decode every complete frame in buffer   │
//!    │    └─> execute ─> queue reply            │
//!    │  flush queued replies                    │
//!    │  read more bytes (0 bytes => peer gone)  │
//!    └──────────────────────────────────────────┘
//! ```
//!
//! ## Buffer Management
//!
//! The stream is not message-bounded: a read may end halfway through a frame
//! or carry several pipelined frames. Undecoded bytes stay in a `BytesMut`
//! accumulation buffer until the rest arrives. Replies are written in the
//! order their requests were decoded.
//!
//! ## Errors
//!
//! A frame that cannot be decoded, or decodes to something other than a
//! request, is fatal: the handler sends `-ERR Protocol error: ...` (best
//! effort) and closes. Command errors are ordinary replies and the loop
//! carries on.

use crate::commands::{Command, CommandHandler, ProtocolError};
use crate::protocol::{ParseError, RespParser, RespValue, MAX_BULK_SIZE};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Default cap on undecoded input held for one client: room for one
/// maximum-size bulk string plus the frame around it.
pub const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
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
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Bytes that are not valid RESP
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Valid RESP that is not a request
    #[error("Protocol error: {0}")]
    ProtocolError(#[from] ProtocolError),

    /// Client disconnected between frames
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client disconnected halfway through a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

impl ConnectionError {
    /// The reply sent before closing, for errors the client caused.
    fn reply(&self) -> Option<RespValue> {
        match self {
            ConnectionError::ParseError(e) => {
                Some(RespValue::error(format!("ERR Protocol error: {}", e)))
            }
            ConnectionError::ProtocolError(e) => {
                Some(RespValue::error(format!("ERR Protocol error: {}", e)))
            }
            ConnectionError::BufferFull => Some(RespValue::error(
                "ERR Protocol error: request exceeds buffer limit",
            )),
            _ => None,
        }
    }
}

/// Drives one client connection.
///
/// Generic over the stream so it works with a `TcpStream` as well as with
/// in-memory streams in tests.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes received but not yet decoded
    buffer: BytesMut,

    /// Scratch space for serializing replies
    reply: Vec<u8>,

    command_handler: CommandHandler,

    parser: RespParser,

    /// Cap on `buffer`; reaching it closes the connection
    max_buffer_size: usize,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            reply: Vec::new(),
            command_handler,
            parser: RespParser::new(),
            max_buffer_size: MAX_BUFFER_SIZE,
            stats,
        }
    }

    /// Sets the most undecoded input this connection may hold.
    pub fn with_max_buffer_size(mut self, max: usize) -> Self {
        self.max_buffer_size = max;
        self
    }

    /// Runs the connection until the client leaves or an error occurs.
    ///
    /// A client that disconnects between frames is a normal close and
    /// returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = match self.main_loop().await {
            Err(ConnectionError::ClientDisconnected) => Ok(()),
            other => other,
        };

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            if let Err(e) = self.process_buffered().await {
                self.reject(&e).await;
                return Err(e);
            }

            // Everything decodable has been answered; push it out before
            // blocking on the next read.
            self.stream.flush().await?;

            if let Err(e) = self.read_more_data().await {
                self.reject(&e).await;
                return Err(e);
            }
        }
    }

    /// Executes every complete request currently in the buffer.
    async fn process_buffered(&mut self) -> Result<(), ConnectionError> {
        while let Some(command) = self.next_command()? {
            let response = self.command_handler.execute(&command);
            self.stats.command_processed();
            self.write_response(&response).await?;
        }
        Ok(())
    }

    /// Decodes the next request from the buffer, if a whole one is there.
    fn next_command(&mut self) -> Result<Option<Command>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((frame, consumed)) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );
                Ok(Some(Command::try_from(frame)?))
            }
            None => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete frame, need more data"
                );
                Ok(None)
            }
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= self.max_buffer_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                limit = self.max_buffer_size,
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return Err(if self.buffer.is_empty() {
                ConnectionError::ClientDisconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Queues a reply. It reaches the client on the next flush.
    async fn write_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        self.reply.clear();
        response.serialize_into(&mut self.reply);
        self.stream.write_all(&self.reply).await?;
        self.stats.bytes_written(self.reply.len());
        trace!(client = %self.addr, bytes = self.reply.len(), "Queued response");
        Ok(())
    }

    /// Best-effort error reply before closing on a client-caused error.
    async fn reject(&mut self, err: &ConnectionError) {
        let Some(reply) = err.reply() else {
            return;
        };
        warn!(client = %self.addr, error = %err, "Closing connection on protocol error");

        if self.write_response(&reply).await.is_ok() {
            let _ = self.stream.flush().await;
        }
    }
}

/// Handles a client connection to completion.
///
/// Errors are logged inside the handler and go no further, so one bad
/// client never affects the others.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    let _ = handler.run().await;
}
