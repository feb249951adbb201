//! CQL protocol connection for client-side use.
//!
//! Handles TCP connection and frame-level send/receive.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

use crate::cql::frame::{Frame, FrameCodec};
use crate::cql::message::Request;
use crate::cql::{CqlError, CqlResult};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqlConnectionState {
    /// TCP connected, STARTUP not yet completed
    Connected,
    /// STARTUP handshake completed
    Ready,
    /// Connection failed
    Failed,
    /// Closed
    Closed,
}

/// Client-side CQL connection.
///
/// Owns the TCP stream and the frame codec. Stream ids correlate responses
/// with requests; this connection issues one request at a time, so ids only
/// guard against protocol confusion.
pub struct CqlConnection {
    /// TCP stream
    stream: TcpStream,
    /// Frame codec (decodes responses, encodes requests)
    codec: FrameCodec,
    /// Read buffer
    read_buffer: BytesMut,
    /// Write buffer
    write_buffer: BytesMut,
    /// Connection state
    state: CqlConnectionState,
    /// Node address
    address: String,
    /// Next stream id
    next_stream: i16,
}

impl CqlConnection {
    /// Connect to a node.
    pub async fn connect(address: &str) -> CqlResult<Self> {
        let stream = TcpStream::connect(address).await.map_err(|e| {
            CqlError::Connection(format!("failed to connect to {}: {}", address, e))
        })?;

        // Lower latency for small request frames
        stream.set_nodelay(true).ok();

        Ok(Self {
            stream,
            codec: FrameCodec::client(),
            read_buffer: BytesMut::with_capacity(8192),
            write_buffer: BytesMut::with_capacity(8192),
            state: CqlConnectionState::Connected,
            address: address.to_string(),
            next_stream: 0,
        })
    }

    fn next_stream_id(&mut self) -> i16 {
        let id = self.next_stream;
        self.next_stream = if self.next_stream == i16::MAX {
            0
        } else {
            self.next_stream + 1
        };
        id
    }

    fn ensure_usable(&self) -> CqlResult<()> {
        match self.state {
            CqlConnectionState::Connected | CqlConnectionState::Ready => Ok(()),
            CqlConnectionState::Failed => {
                Err(CqlError::Protocol("connection is in failed state".into()))
            }
            CqlConnectionState::Closed => Err(CqlError::ConnectionClosed),
        }
    }

    /// Send a request frame with the given stream id.
    pub async fn send(&mut self, request: &Request, stream: i16, tracing: bool) -> CqlResult<()> {
        self.ensure_usable()?;

        let body = request.encode_body()?;
        let frame = Frame::request(request.opcode(), stream, tracing, body);

        self.write_buffer.clear();
        self.codec.encode(frame, &mut self.write_buffer)?;

        self.stream.write_all(&self.write_buffer).await.map_err(|e| {
            self.state = CqlConnectionState::Failed;
            CqlError::Connection(format!("send failed: {}", e))
        })?;
        self.stream.flush().await.map_err(|e| {
            self.state = CqlConnectionState::Failed;
            CqlError::Connection(format!("flush failed: {}", e))
        })?;

        Ok(())
    }

    /// Receive the next response frame.
    pub async fn recv(&mut self) -> CqlResult<Frame> {
        self.ensure_usable()?;

        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(frame);
            }

            let n = self
                .stream
                .read_buf(&mut self.read_buffer)
                .await
                .map_err(|e| {
                    self.state = CqlConnectionState::Failed;
                    CqlError::Connection(format!("read failed: {}", e))
                })?;

            if n == 0 {
                self.state = CqlConnectionState::Closed;
                return Err(CqlError::ConnectionClosed);
            }
        }
    }

    /// Send a request and wait for its response frame.
    ///
    /// Frames for other stream ids (pushed events use id -1) are skipped.
    pub async fn request(&mut self, request: &Request, tracing: bool) -> CqlResult<Frame> {
        let stream = self.next_stream_id();
        self.send(request, stream, tracing).await?;

        loop {
            let frame = self.recv().await?;
            if frame.stream == stream {
                return Ok(frame);
            }
            if frame.stream >= 0 {
                return Err(CqlError::Protocol(format!(
                    "response for unexpected stream {} (awaiting {})",
                    frame.stream, stream
                )));
            }
        }
    }

    /// Mark the STARTUP handshake as completed.
    pub fn mark_ready(&mut self) {
        self.state = CqlConnectionState::Ready;
    }

    /// Mark the connection as failed.
    pub fn mark_failed(&mut self) {
        self.state = CqlConnectionState::Failed;
    }

    /// Close the connection.
    pub async fn close(&mut self) {
        self.state = CqlConnectionState::Closed;
        let _ = self.stream.shutdown().await;
    }

    /// Get the connection state.
    pub fn state(&self) -> CqlConnectionState {
        self.state
    }

    /// Get the node address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check if the connection is ready for statements.
    pub fn is_ready(&self) -> bool {
        self.state == CqlConnectionState::Ready
    }
}

impl std::fmt::Debug for CqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CqlConnection")
            .field("address", &self.address)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert_ne!(CqlConnectionState::Connected, CqlConnectionState::Ready);
        assert_eq!(CqlConnectionState::Closed, CqlConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is essentially never listening
        let result = CqlConnection::connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(CqlError::Connection(_))));
    }
}
