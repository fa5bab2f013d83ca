//! Per-Connection Worker
//!
//! Each accepted client gets one async task running the request/response
//! loop: accumulate socket bytes in a buffer, decode every complete request,
//! execute it, and write the reply back before decoding the next one. TCP is
//! a stream, so a single read may carry a partial request or several
//! pipelined ones; the buffer handles both.
//!
//! The loop terminates on client disconnect, a framing error (the stream
//! position is untrustworthy afterwards, so no error reply is sent), a
//! 30 second read deadline, a write failure, or server shutdown. Shutdown is
//! observed at every loop head and also interrupts an in-flight read.

use crate::commands::CommandHandler;
use crate::protocol::{decode_request, DecodeError, MAX_BULK_SIZE};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Idle connections are dropped after this long without a complete read.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// The accumulation buffer may not outgrow one maximal request by much.
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 16 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters, shared across workers.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Connections accepted and registered
    pub accepted: AtomicU64,
    /// Connections closed at accept time because the cap was reached
    pub rejected: AtomicU64,
    /// Commands executed across all connections
    pub commands: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Framing(#[from] DecodeError),

    #[error("client disconnected")]
    Disconnected,

    #[error("connection closed mid-request")]
    UnexpectedEof,

    #[error("read deadline elapsed")]
    IdleTimeout,

    #[error("request buffer limit exceeded")]
    BufferFull,
}

/// Owns one client socket and serializes its requests.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    commands: CommandHandler,
    shutdown: watch::Receiver<bool>,
    stats: Arc<ConnectionStats>,
    reply_buf: Vec<u8>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        shutdown: watch::Receiver<bool>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_accepted();
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            commands,
            shutdown,
            stats,
            reply_buf: Vec::new(),
        }
    }

    /// Runs the request/response loop to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.serve().await;
        match &result {
            Ok(()) => debug!(client = %self.addr, "Connection closed"),
            Err(ConnectionError::Disconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IdleTimeout) => {
                info!(client = %self.addr, "Connection idle, closing")
            }
            Err(ConnectionError::Io(err))
                if err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(err) => warn!(client = %self.addr, error = %err, "Connection error"),
        }
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            // A dropped sender counts as shutdown too.
            if self.shutdown.has_changed().is_err() || *self.shutdown.borrow() {
                return Ok(());
            }

            // Drain every request already buffered before reading again;
            // reply N is always written before request N+1 is decoded.
            while let Some(args) = self.next_request()? {
                // `*0` and null arrays decode to nothing worth answering.
                if args.is_empty() {
                    continue;
                }
                let reply = self.commands.execute(&args);
                self.stats.command_processed();

                self.reply_buf.clear();
                reply.write_to(&mut self.reply_buf);
                self.stream.write_all(&self.reply_buf).await?;
                self.stream.flush().await?;
            }

            self.fill_buffer().await?;
        }
    }

    /// Decodes the next complete request out of the buffer, if any.
    fn next_request(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match decode_request(&self.buffer)? {
            Some((args, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(client = %self.addr, consumed, "Decoded request");
                Ok(Some(args))
            }
            None => Ok(None),
        }
    }

    /// Reads more bytes into the buffer, bounded by the read deadline and
    /// interruptible by shutdown.
    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(ConnectionError::BufferFull);
        }

        let read = tokio::select! {
            _ = self.shutdown.changed() => return Ok(()),
            read = tokio::time::timeout(
                READ_TIMEOUT,
                self.stream.get_mut().read_buf(&mut self.buffer),
            ) => read,
        };

        let n = match read {
            Err(_) => return Err(ConnectionError::IdleTimeout),
            Ok(result) => result?,
        };

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::Disconnected);
            }
            return Err(ConnectionError::UnexpectedEof);
        }

        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }
}

/// Serves one connection to completion, swallowing the expected ways a
/// client goes away.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    shutdown: watch::Receiver<bool>,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, commands, shutdown, stats);
    let _ = handler.run().await;
}
