//! Diameter transport layer (TCP)
//!
//! Provides TCP-based transport for Diameter messages per RFC 6733 Section 2.1.
//! Diameter uses a 4-byte length prefix in the message header for framing.
//! The first byte is the version, and the next 3 bytes are the message length.
//!
//! A transport can be split into independently owned read and write halves
//! so that a reader task and a writer task can share one connection.

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{DiameterError, DiameterResult};
use crate::message::{DiameterMessage, DIAMETER_HEADER_SIZE};

/// Maximum Diameter message size (default 64KB, RFC allows up to 16MB)
const MAX_MESSAGE_SIZE: usize = 65536;

/// Diameter transport connection wrapping a TCP stream
pub struct DiameterTransport {
    reader: DiameterReader,
    writer: DiameterWriter,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl DiameterTransport {
    /// Wrap an existing TCP stream as a Diameter transport
    pub fn new(stream: TcpStream) -> DiameterResult<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: DiameterReader {
                half: read_half,
                read_buf: BytesMut::with_capacity(4096),
            },
            writer: DiameterWriter { half: write_half },
            peer_addr,
            local_addr,
        })
    }

    /// Connect to a remote Diameter peer
    pub async fn connect(addr: SocketAddr) -> DiameterResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream)
    }

    /// Get the remote peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the local address of the connection
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a Diameter message
    pub async fn send(&mut self, msg: &DiameterMessage) -> DiameterResult<()> {
        self.writer.send(msg).await
    }

    /// Receive a Diameter message
    pub async fn recv(&mut self) -> DiameterResult<DiameterMessage> {
        self.reader.recv().await
    }

    /// Split into read and write halves
    pub fn into_split(self) -> (DiameterReader, DiameterWriter) {
        (self.reader, self.writer)
    }

    /// Shutdown the transport connection
    pub async fn shutdown(&mut self) -> DiameterResult<()> {
        self.writer.shutdown().await
    }
}

/// Receiving half of a Diameter transport
pub struct DiameterReader {
    half: OwnedReadHalf,
    read_buf: BytesMut,
}

impl DiameterReader {
    /// Receive a Diameter message
    ///
    /// Reads from the TCP stream, performing message framing based on the
    /// 3-byte length field in the Diameter header (bytes 1-3). Cancelling
    /// the returned future loses no data.
    pub async fn recv(&mut self) -> DiameterResult<DiameterMessage> {
        loop {
            if let Some(msg) = try_parse_message(&mut self.read_buf)? {
                return Ok(msg);
            }

            let n = self.half.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(DiameterError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )));
            }
        }
    }
}

/// Sending half of a Diameter transport
pub struct DiameterWriter {
    half: OwnedWriteHalf,
}

impl DiameterWriter {
    /// Send a Diameter message
    pub async fn send(&mut self, msg: &DiameterMessage) -> DiameterResult<()> {
        let encoded = msg.encode();
        self.half.write_all(&encoded).await?;
        self.half.flush().await?;
        Ok(())
    }

    /// Shutdown the write direction
    pub async fn shutdown(&mut self) -> DiameterResult<()> {
        self.half.shutdown().await?;
        Ok(())
    }
}

/// Try to parse a complete Diameter message from the front of `read_buf`
fn try_parse_message(read_buf: &mut BytesMut) -> DiameterResult<Option<DiameterMessage>> {
    if read_buf.len() < DIAMETER_HEADER_SIZE {
        return Ok(None);
    }

    // Read message length from header bytes 1-3 (3-byte big-endian)
    let len_high = read_buf[1] as usize;
    let len_mid = read_buf[2] as usize;
    let len_low = read_buf[3] as usize;
    let msg_len = (len_high << 16) | (len_mid << 8) | len_low;

    if msg_len < DIAMETER_HEADER_SIZE {
        return Err(DiameterError::InvalidMessage(format!(
            "message length {msg_len} is less than header size"
        )));
    }

    if msg_len > MAX_MESSAGE_SIZE {
        return Err(DiameterError::InvalidMessage(format!(
            "message length {msg_len} exceeds maximum {MAX_MESSAGE_SIZE}"
        )));
    }

    if read_buf.len() < msg_len {
        return Ok(None);
    }

    let mut bytes = read_buf.split_to(msg_len).freeze();
    let msg = DiameterMessage::decode(&mut bytes)?;
    Ok(Some(msg))
}

/// Diameter TCP listener that accepts incoming connections
pub struct DiameterListener {
    listener: TcpListener,
}

impl DiameterListener {
    /// Bind to the given address
    pub async fn bind(addr: SocketAddr) -> DiameterResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept a new incoming connection
    pub async fn accept(&self) -> DiameterResult<DiameterTransport> {
        let (stream, _addr) = self.listener.accept().await?;
        DiameterTransport::new(stream)
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> DiameterResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
