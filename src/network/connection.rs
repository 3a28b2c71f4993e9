//! Connection handling for GUI sessions
//!
//! Manages a single GUI connection, including:
//! - Frame encoding/decoding over the byte stream
//! - Connection state and statistics
//! - Handles for queueing outbound frames from other tasks

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::protocol::{CodecError, Decoder, Encoder, Frame, Message};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("Connection closed")]
    Closed,

    #[error("Send channel closed")]
    SendChannelClosed,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Stream established, frames flowing
    Connected,
    /// Connection is closing
    Closing,
    /// Connection has been closed
    Closed,
}

/// A connection to a GUI
pub struct Connection<S = TcpStream> {
    /// Remote peer address
    remote_addr: SocketAddr,
    /// The byte stream
    stream: S,
    /// Protocol encoder
    encoder: Encoder,
    /// Protocol decoder
    decoder: Decoder,
    /// Read buffer
    read_buf: BytesMut,
    /// Write buffer
    write_buf: BytesMut,
    /// Connection state
    state: ConnectionState,
    /// Statistics
    stats: ConnectionStats,
}

/// Connection statistics
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Frames sent
    pub messages_sent: u64,
    /// Frames received
    pub messages_received: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new connection from an established stream
    pub fn new(stream: S, remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            stream,
            encoder: Encoder::new(),
            decoder: Decoder::new(),
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
            state: ConnectionState::Connected,
            stats: ConnectionStats::default(),
        }
    }

    /// Get the remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get connection statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Send a frame
    pub async fn send(&mut self, frame: &Frame) -> ConnectionResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::Closed);
        }

        self.write_buf.clear();
        self.encoder.encode(frame, &mut self.write_buf)?;

        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        self.stats.messages_sent += 1;
        self.stats.bytes_sent += self.write_buf.len() as u64;

        tracing::trace!(
            "Sent {} (xid {}) to {}",
            frame.message.message_type(),
            frame.xid,
            self.remote_addr
        );

        Ok(())
    }

    /// Receive a frame
    ///
    /// Returns `Ok(None)` when the peer closed the stream between frames.
    pub async fn recv(&mut self) -> ConnectionResult<Option<Frame>> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.read_buf)? {
                self.stats.messages_received += 1;
                return Ok(Some(frame));
            }

            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await?;

            if n == 0 {
                self.state = ConnectionState::Closed;
                if self.read_buf.is_empty() {
                    return Ok(None);
                } else {
                    return Err(ConnectionError::Closed);
                }
            }

            self.read_buf.extend_from_slice(&buf[..n]);
            self.stats.bytes_received += n as u64;
        }
    }

    /// Shut down the write half of the stream
    pub async fn close(&mut self) -> ConnectionResult<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closing;
        self.stream.shutdown().await?;
        self.state = ConnectionState::Closed;
        Ok(())
    }
}

/// Commands queued for a connection task
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Write a frame to the peer
    Frame(Frame),
    /// Close the connection
    Close,
}

/// A handle for sending frames to a connection
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<Outbound>,
    connected: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            sender,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Queue a frame for this connection
    pub async fn send(&self, frame: Frame) -> ConnectionResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }

        self.sender
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| ConnectionError::SendChannelClosed)
    }

    /// Queue an unsolicited message, which carries a zero transaction id
    pub async fn notify(&self, message: Message) -> ConnectionResult<()> {
        self.send(Frame::new(0, message)).await
    }

    /// Ask the connection task to close the connection
    pub async fn close(&self) -> ConnectionResult<()> {
        self.sender
            .send(Outbound::Close)
            .await
            .map_err(|_| ConnectionError::SendChannelClosed)
    }

    /// Check if the connection is still active
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Mark the connection as disconnected
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
