//! CQL native protocol framing.
//!
//! Every message travels in a frame with a fixed 9-byte header:
//! version (1), flags (1), stream id (2, big-endian signed), opcode (1)
//! and body length (4, big-endian unsigned). Responses may prefix the body
//! with a tracing id and a warning list depending on the header flags.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::CqlError;
use super::wire::{self, Reader};

/// Protocol version implemented by this driver.
pub const PROTOCOL_VERSION: u8 = 0x04;

/// Version byte carried by request frames.
pub const REQUEST_VERSION: u8 = PROTOCOL_VERSION;

/// Version byte carried by response frames.
pub const RESPONSE_VERSION: u8 = PROTOCOL_VERSION | 0x80;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 9;

/// Header flag bits.
pub mod flags {
    /// Body is compressed (not supported by this driver).
    pub const COMPRESSION: u8 = 0x01;
    /// Tracing requested (request) or tracing id present (response).
    pub const TRACING: u8 = 0x02;
    /// Custom payload present.
    pub const CUSTOM_PAYLOAD: u8 = 0x04;
    /// Warnings present.
    pub const WARNING: u8 = 0x08;
}

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
    Batch = 0x0D,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
}

impl Opcode {
    /// Parse an opcode byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Error),
            0x01 => Some(Self::Startup),
            0x02 => Some(Self::Ready),
            0x03 => Some(Self::Authenticate),
            0x05 => Some(Self::Options),
            0x06 => Some(Self::Supported),
            0x07 => Some(Self::Query),
            0x08 => Some(Self::Result),
            0x09 => Some(Self::Prepare),
            0x0A => Some(Self::Execute),
            0x0B => Some(Self::Register),
            0x0C => Some(Self::Event),
            0x0D => Some(Self::Batch),
            0x0E => Some(Self::AuthChallenge),
            0x0F => Some(Self::AuthResponse),
            0x10 => Some(Self::AuthSuccess),
            _ => None,
        }
    }
}

/// A decoded frame envelope.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame opcode.
    pub opcode: Opcode,
    /// Stream id correlating requests and responses.
    pub stream: i16,
    /// Tracing requested (request side) / tracing id attached (response side).
    pub tracing: bool,
    /// Tracing session id, present on traced responses.
    pub tracing_id: Option<uuid::Uuid>,
    /// Warnings attached by the coordinator.
    pub warnings: Vec<String>,
    /// Message body, stripped of tracing id and warnings.
    pub body: Bytes,
}

impl Frame {
    /// Build a request frame.
    pub fn request(opcode: Opcode, stream: i16, tracing: bool, body: Bytes) -> Self {
        Self {
            opcode,
            stream,
            tracing,
            tracing_id: None,
            warnings: Vec::new(),
            body,
        }
    }

    /// Build a response frame.
    pub fn response(opcode: Opcode, stream: i16, tracing_id: Option<uuid::Uuid>, body: Bytes) -> Self {
        Self {
            opcode,
            stream,
            tracing: tracing_id.is_some(),
            tracing_id,
            warnings: Vec::new(),
            body,
        }
    }
}

/// Direction the codec operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Decodes responses, encodes requests (driver side).
    Client,
    /// Decodes requests, encodes responses (mock node side).
    Server,
}

/// Frame codec for tokio_util.
#[derive(Debug)]
pub struct FrameCodec {
    direction: Direction,
    max_frame_size: usize,
}

/// Default maximum frame size (256 MB, the protocol's native_transport limit).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

impl FrameCodec {
    /// Codec for the driver side: decodes responses, encodes requests.
    pub fn client() -> Self {
        Self {
            direction: Direction::Client,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Codec for the server side: decodes requests, encodes responses.
    pub fn server() -> Self {
        Self {
            direction: Direction::Server,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Override the maximum accepted frame size.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    fn expected_version(&self) -> u8 {
        match self.direction {
            Direction::Client => RESPONSE_VERSION,
            Direction::Server => REQUEST_VERSION,
        }
    }

    fn outgoing_version(&self) -> u8 {
        match self.direction {
            Direction::Client => REQUEST_VERSION,
            Direction::Server => RESPONSE_VERSION,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CqlError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let version = src[0];
        if version != self.expected_version() {
            return Err(CqlError::UnsupportedVersion(version));
        }

        let frame_flags = src[1];
        if frame_flags & flags::COMPRESSION != 0 {
            return Err(CqlError::Protocol(
                "compressed frames are not supported".to_string(),
            ));
        }

        let length = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize;
        if length > self.max_frame_size {
            return Err(CqlError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        let stream = i16::from_be_bytes([src[2], src[3]]);
        let opcode = Opcode::from_byte(src[4])
            .ok_or_else(|| CqlError::Protocol(format!("unknown opcode: {:#04x}", src[4])))?;

        src.advance(HEADER_SIZE);
        let mut body = src.split_to(length).freeze();

        // Responses carry the tracing id and warnings ahead of the body.
        let mut tracing_id = None;
        let mut warnings = Vec::new();
        if self.direction == Direction::Client {
            let consumed = {
                let mut r = Reader::new(&body);
                if frame_flags & flags::TRACING != 0 {
                    tracing_id = Some(r.uuid()?);
                }
                if frame_flags & flags::WARNING != 0 {
                    warnings = r.string_list()?;
                }
                if frame_flags & flags::CUSTOM_PAYLOAD != 0 {
                    r.bytes_map()?;
                }
                r.position()
            };
            body.advance(consumed);
        }

        Ok(Some(Frame {
            opcode,
            stream,
            tracing: frame_flags & flags::TRACING != 0,
            tracing_id,
            warnings,
            body,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CqlError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut prefix = BytesMut::new();
        let mut frame_flags = 0u8;

        match self.direction {
            Direction::Client => {
                if item.tracing {
                    frame_flags |= flags::TRACING;
                }
            }
            Direction::Server => {
                if let Some(id) = &item.tracing_id {
                    frame_flags |= flags::TRACING;
                    wire::put_uuid(&mut prefix, id);
                }
                if !item.warnings.is_empty() {
                    frame_flags |= flags::WARNING;
                    wire::put_string_list(&mut prefix, &item.warnings)?;
                }
            }
        }

        let length = prefix.len() + item.body.len();
        if length > self.max_frame_size {
            return Err(CqlError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        dst.reserve(HEADER_SIZE + length);
        dst.put_u8(self.outgoing_version());
        dst.put_u8(frame_flags);
        dst.put_i16(item.stream);
        dst.put_u8(item.opcode as u8);
        dst.put_u32(length as u32);
        dst.put_slice(&prefix);
        dst.put_slice(&item.body);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_byte() {
        assert_eq!(Opcode::from_byte(0x07), Some(Opcode::Query));
        assert_eq!(Opcode::from_byte(0x10), Some(Opcode::AuthSuccess));
        assert_eq!(Opcode::from_byte(0x04), None);
        assert_eq!(Opcode::from_byte(0xFF), None);
    }

    #[test]
    fn test_request_roundtrip() {
        let mut client = FrameCodec::client();
        let mut server = FrameCodec::server();

        let frame = Frame::request(Opcode::Query, 7, false, Bytes::from_static(b"body"));
        let mut buf = BytesMut::new();
        client.encode(frame, &mut buf).unwrap();

        let decoded = server.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.opcode, Opcode::Query);
        assert_eq!(decoded.stream, 7);
        assert_eq!(&decoded.body[..], b"body");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_response_with_tracing_id() {
        let mut client = FrameCodec::client();
        let mut server = FrameCodec::server();

        let id = uuid::Uuid::new_v4();
        let frame = Frame::response(Opcode::Result, 3, Some(id), Bytes::from_static(b"rows"));
        let mut buf = BytesMut::new();
        server.encode(frame, &mut buf).unwrap();

        let decoded = client.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.opcode, Opcode::Result);
        assert_eq!(decoded.tracing_id, Some(id));
        assert_eq!(&decoded.body[..], b"rows");
    }

    #[test]
    fn test_partial_frame() {
        let mut client = FrameCodec::client();
        let mut server = FrameCodec::server();

        let frame = Frame::response(Opcode::Ready, 0, None, Bytes::new());
        let mut full = BytesMut::new();
        server.encode(frame, &mut full).unwrap();

        // Header only, then the rest
        let mut partial = BytesMut::from(&full[..5]);
        assert!(client.decode(&mut partial).unwrap().is_none());

        let mut complete = full;
        let decoded = client.decode(&mut complete).unwrap().unwrap();
        assert_eq!(decoded.opcode, Opcode::Ready);
    }

    #[test]
    fn test_version_mismatch() {
        let mut client = FrameCodec::client();
        // A request frame fed to the client decoder
        let mut buf = BytesMut::new();
        buf.put_u8(REQUEST_VERSION);
        buf.put_slice(&[0, 0, 0, 0x02, 0, 0, 0, 0]);
        assert!(matches!(
            client.decode(&mut buf),
            Err(CqlError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_frame_too_large() {
        let mut client = FrameCodec::client().with_max_frame_size(16);
        let mut buf = BytesMut::new();
        buf.put_u8(RESPONSE_VERSION);
        buf.put_u8(0);
        buf.put_i16(0);
        buf.put_u8(Opcode::Result as u8);
        buf.put_u32(64);
        assert!(matches!(
            client.decode(&mut buf),
            Err(CqlError::FrameTooLarge { size: 64, max: 16 })
        ));
    }

    #[test]
    fn test_compressed_frame_rejected() {
        let mut client = FrameCodec::client();
        let mut buf = BytesMut::new();
        buf.put_u8(RESPONSE_VERSION);
        buf.put_u8(flags::COMPRESSION);
        buf.put_i16(0);
        buf.put_u8(Opcode::Result as u8);
        buf.put_u32(0);
        assert!(matches!(client.decode(&mut buf), Err(CqlError::Protocol(_))));
    }

    #[test]
    fn test_multiple_frames() {
        let mut client = FrameCodec::client();
        let mut server = FrameCodec::server();

        let mut buf = BytesMut::new();
        for stream in 0..3i16 {
            let frame = Frame::response(Opcode::Ready, stream, None, Bytes::new());
            server.encode(frame, &mut buf).unwrap();
        }

        for stream in 0..3i16 {
            let decoded = client.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded.stream, stream);
        }
        assert!(client.decode(&mut buf).unwrap().is_none());
    }
}
