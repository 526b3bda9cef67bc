use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::error::{Result, TribleError};
use crate::transport::codec::ProtocolCodec;

/// Initial read buffer capacity; grows to fit larger frames.
const READ_CHUNK: usize = 8 * 1024;

/// Sends one encoded request frame to a provider and returns its response frame.
///
/// Implementations must return the raw bytes of exactly one complete frame.
/// Decoding is left to the caller. Failures to reach the provider or an
/// interrupted exchange are reported as `Transport`, an exchange that does not
/// finish within `timeout` as `Timeout`, and a response whose header cannot be
/// parsed as `ProtocolDecode`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, addr: &str, frame: Bytes, timeout: Duration) -> Result<Bytes>;
}

/// Async TCP transport.
///
/// Opens a fresh connection per exchange, writes the request frame and reads
/// until one complete response frame has arrived. The whole exchange, connect
/// included, is bounded by the supplied timeout.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use trible_common::transport::{ProtocolCodec, TcpTransport, Transport};
/// use trible_common::{Envelope, Header};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransport::new();
/// let frame = ProtocolCodec::encode(&Envelope::new(Header::request(1, 1), &b"{}"[..]));
/// let _reply = transport
///     .send("127.0.0.1:1205", frame, Duration::from_secs(5))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }

    async fn exchange(addr: &str, frame: &[u8], timeout_ms: u64) -> Result<Bytes> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Self::map_io_error(e, &format!("connecting to {addr}"), timeout_ms))?;

        // Small frames; send immediately
        stream.set_nodelay(true).ok();

        stream
            .write_all(frame)
            .await
            .map_err(|e| Self::map_io_error(e, "writing frame", timeout_ms))?;
        stream
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream", timeout_ms))?;

        Self::read_frame(&mut stream, timeout_ms).await
    }

    /// Reads until the buffer holds one complete frame.
    async fn read_frame(stream: &mut TcpStream, timeout_ms: u64) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);

        loop {
            if let Some(len) = ProtocolCodec::frame_length(&buf)? {
                if buf.len() > len {
                    debug!(extra = buf.len() - len, "Discarding bytes after response frame");
                }
                return Ok(buf.split_to(len).freeze());
            }

            let n = stream
                .read_buf(&mut buf)
                .await
                .map_err(|e| Self::map_io_error(e, "reading frame", timeout_ms))?;

            if n == 0 {
                return Err(TribleError::Transport(format!(
                    "connection closed after {} bytes, before a complete frame",
                    buf.len()
                )));
            }
        }
    }

    /// Map IO errors to the transport error taxonomy
    ///
    /// - Timeouts/would block -> `Timeout`
    /// - Everything else -> `Transport`, so the retry layer may try again
    fn map_io_error(err: std::io::Error, context: &str, timeout_ms: u64) -> TribleError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TribleError::Timeout(timeout_ms)
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => {
                TribleError::Transport(format!("{}: Connection lost", context))
            }
            _ => TribleError::Transport(format!("{}: {}", context, err)),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, addr: &str, frame: Bytes, timeout: Duration) -> Result<Bytes> {
        let timeout_ms = timeout.as_millis() as u64;
        debug!(addr, bytes = frame.len(), "Sending frame");

        match tokio::time::timeout(timeout, Self::exchange(addr, &frame, timeout_ms)).await {
            Ok(result) => result,
            Err(_) => Err(TribleError::Timeout(timeout_ms)),
        }
    }
}
