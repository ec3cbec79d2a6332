//! Transport layer - Pure I/O abstraction for message exchange
//!
//! Moves raw text between this process and the language server without any
//! knowledge of message framing. The stream transport works over any pair of
//! async byte streams: child process pipes in production, in-memory duplex
//! pipes in tests.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, trace};

// ============================================================================
// Constants
// ============================================================================

/// Size of the read buffer for stream reads
const READ_BUFFER_SIZE: usize = 4096;

/// Default capacity for the UTF-8 accumulation buffer
const UTF8_ACCUMULATION_BUFFER_CAPACITY: usize = 8192;

/// Core transport trait for bidirectional message exchange
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a chunk of text
    async fn send(&mut self, message: &str) -> Result<(), Self::Error>;

    /// Receive the next chunk of text
    async fn receive(&mut self) -> Result<String, Self::Error>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is still active
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Stream Transport Implementation
// ============================================================================

/// Error types for stream transports
#[derive(Debug, thiserror::Error)]
pub enum StdioTransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Transport over an async writer (server stdin) and reader (server stdout)
#[derive(Debug)]
pub struct StreamTransport {
    /// Channel feeding the writer task
    outbound: Option<mpsc::UnboundedSender<String>>,

    /// Channel fed by the reader task
    inbound: Option<mpsc::UnboundedReceiver<String>>,

    /// Connection status
    connected: bool,
}

/// Transport over a child process' stdin/stdout
pub type StdioTransport = StreamTransport;

/// Accumulates raw bytes until they form valid UTF-8
struct Utf8Accumulator {
    bytes: Vec<u8>,
}

impl Utf8Accumulator {
    fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(UTF8_ACCUMULATION_BUFFER_CAPACITY),
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Take the longest valid UTF-8 prefix, keeping a trailing partial
    /// sequence for the next read
    fn take_valid(&mut self) -> Option<String> {
        if self.bytes.is_empty() {
            return None;
        }

        let valid_end = match std::str::from_utf8(&self.bytes) {
            Ok(_) => self.bytes.len(),
            Err(e) => e.valid_up_to(),
        };
        if valid_end == 0 {
            return None;
        }

        let valid: Vec<u8> = self.bytes.drain(..valid_end).collect();
        if self.bytes.capacity() > UTF8_ACCUMULATION_BUFFER_CAPACITY * 2 {
            self.bytes.shrink_to(UTF8_ACCUMULATION_BUFFER_CAPACITY);
        }
        String::from_utf8(valid).ok()
    }
}

impl StreamTransport {
    /// Create a transport from a writer and a reader, spawning one task each
    pub fn new<W, R>(writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::writer_task(writer, outbound_rx));
        tokio::spawn(Self::reader_task(reader, inbound_tx));

        Self {
            outbound: Some(outbound_tx),
            inbound: Some(inbound_rx),
            connected: true,
        }
    }

    async fn writer_task<W>(mut writer: W, mut receiver: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(message) = receiver.recv().await {
            trace!("StreamTransport: writing {} bytes", message.len());

            if let Err(e) = writer.write_all(message.as_bytes()).await {
                error!("Failed to write to language server: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("Failed to flush language server input: {}", e);
                break;
            }
        }

        let _ = writer.shutdown().await;
        trace!("StreamTransport: writer task finished");
    }

    async fn reader_task<R>(reader: R, sender: mpsc::UnboundedSender<String>)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut accumulator = Utf8Accumulator::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => {
                    if !accumulator.bytes.is_empty() {
                        error!(
                            "StreamTransport: {} incomplete UTF-8 bytes at EOF",
                            accumulator.bytes.len()
                        );
                    }
                    break;
                }
                Ok(n) => {
                    accumulator.push(&buffer[..n]);
                    while let Some(text) = accumulator.take_valid() {
                        if sender.send(text).is_err() {
                            trace!("StreamTransport: receiver dropped, stopping reader");
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to read from language server: {}", e);
                    break;
                }
            }
        }

        trace!("StreamTransport: reader task finished");
    }
}

#[async_trait]
impl Transport for StreamTransport {
    type Error = StdioTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        self.outbound
            .as_ref()
            .ok_or(StdioTransportError::Disconnected)?
            .send(message.to_string())
            .map_err(|e| StdioTransportError::Channel(e.to_string()))
    }

    async fn receive(&mut self) -> Result<String, Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let inbound = self
            .inbound
            .as_mut()
            .ok_or(StdioTransportError::Disconnected)?;

        match inbound.recv().await {
            Some(text) => Ok(text),
            None => {
                self.connected = false;
                Err(StdioTransportError::Disconnected)
            }
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        self.outbound.take();
        self.inbound.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_transport_round_trip_over_duplex() {
        let (client_side, server_side) = tokio::io::duplex(1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (mut server_read, mut server_write) = tokio::io::split(server_side);

        let mut transport = StreamTransport::new(client_write, client_read);
        transport.send("ping").await.unwrap();

        let mut buf = [0u8; 4];
        server_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server_write.write_all(b"pong").await.unwrap();
        assert_eq!(transport.receive().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_receive_after_peer_closes() {
        let (client_side, server_side) = tokio::io::duplex(64);
        let (client_read, client_write) = tokio::io::split(client_side);
        drop(server_side);

        let mut transport = StreamTransport::new(client_write, client_read);
        assert!(matches!(
            transport.receive().await,
            Err(StdioTransportError::Disconnected)
        ));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_close_rejects_further_io() {
        let (client_side, _server_side) = tokio::io::duplex(64);
        let (client_read, client_write) = tokio::io::split(client_side);
        let mut transport = StreamTransport::new(client_write, client_read);

        transport.close().await.unwrap();
        assert!(transport.send("x").await.is_err());
        assert!(transport.receive().await.is_err());
    }

    #[test]
    fn test_accumulator_holds_split_multibyte_sequence() {
        let mut acc = Utf8Accumulator::new();

        // "puts 'é'" split inside the two-byte é
        acc.push(b"puts '\xC3");
        assert_eq!(acc.take_valid().as_deref(), Some("puts '"));
        assert!(acc.take_valid().is_none());

        acc.push(b"\xA9'");
        assert_eq!(acc.take_valid().as_deref(), Some("é'"));
        assert!(acc.bytes.is_empty());
    }
}
