//! CQL protocol error types.

use std::fmt;
use std::io;

use super::codec::CodecError;
use super::wire::WireError;

/// Result type for protocol operations.
pub type CqlResult<T> = Result<T, CqlError>;

/// CQL protocol errors.
#[derive(Debug)]
pub enum CqlError {
    /// I/O error
    Io(io::Error),

    /// Primitive notation error
    Wire(WireError),

    /// Typed value codec error
    Codec(CodecError),

    /// Protocol error (invalid message format, unexpected opcode, etc.)
    Protocol(String),

    /// Authentication error
    Authentication(String),

    /// Error reported by the coordinator
    Server { code: i32, message: String },

    /// Frame exceeds the configured maximum
    FrameTooLarge { size: usize, max: usize },

    /// Response frame carried an unsupported protocol version
    UnsupportedVersion(u8),

    /// Connection closed by the peer
    ConnectionClosed,

    /// Connection-level failure (connect/send/receive)
    Connection(String),
}

impl fmt::Display for CqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlError::Io(e) => write!(f, "I/O error: {}", e),
            CqlError::Wire(e) => write!(f, "Wire error: {}", e),
            CqlError::Codec(e) => write!(f, "Codec error: {}", e),
            CqlError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            CqlError::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            CqlError::Server { code, message } => {
                write!(f, "Server error {:#06x}: {}", code, message)
            }
            CqlError::FrameTooLarge { size, max } => {
                write!(f, "Frame too large: {} bytes (max: {})", size, max)
            }
            CqlError::UnsupportedVersion(v) => {
                write!(f, "Unsupported protocol version: {:#04x}", v)
            }
            CqlError::ConnectionClosed => write!(f, "Connection closed"),
            CqlError::Connection(msg) => write!(f, "Connection error: {}", msg),
        }
    }
}

impl std::error::Error for CqlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CqlError::Io(e) => Some(e),
            CqlError::Wire(e) => Some(e),
            CqlError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CqlError {
    fn from(err: io::Error) -> Self {
        CqlError::Io(err)
    }
}

impl From<WireError> for CqlError {
    fn from(err: WireError) -> Self {
        CqlError::Wire(err)
    }
}

impl From<CodecError> for CqlError {
    fn from(err: CodecError) -> Self {
        CqlError::Codec(err)
    }
}

impl CqlError {
    /// Whether the error is worth retrying against another node.
    pub fn is_transient(&self) -> bool {
        match self {
            CqlError::Io(_) | CqlError::ConnectionClosed => true,
            CqlError::Server { code, .. } => DbErrorCode::is_transient(*code),
            _ => false,
        }
    }
}

/// Error codes reported by the coordinator in ERROR frames.
pub struct DbErrorCode;

impl DbErrorCode {
    pub const SERVER_ERROR: i32 = 0x0000;
    pub const PROTOCOL_ERROR: i32 = 0x000A;
    pub const AUTH_ERROR: i32 = 0x0100;
    pub const UNAVAILABLE: i32 = 0x1000;
    pub const OVERLOADED: i32 = 0x1001;
    pub const IS_BOOTSTRAPPING: i32 = 0x1002;
    pub const TRUNCATE_ERROR: i32 = 0x1003;
    pub const WRITE_TIMEOUT: i32 = 0x1100;
    pub const READ_TIMEOUT: i32 = 0x1200;
    pub const READ_FAILURE: i32 = 0x1300;
    pub const FUNCTION_FAILURE: i32 = 0x1400;
    pub const WRITE_FAILURE: i32 = 0x1500;
    pub const SYNTAX_ERROR: i32 = 0x2000;
    pub const UNAUTHORIZED: i32 = 0x2100;
    pub const INVALID: i32 = 0x2200;
    pub const CONFIG_ERROR: i32 = 0x2300;
    pub const ALREADY_EXISTS: i32 = 0x2400;
    pub const UNPREPARED: i32 = 0x2500;

    /// Whether a coordinator error code describes a transient condition.
    pub fn is_transient(code: i32) -> bool {
        matches!(
            code,
            Self::UNAVAILABLE | Self::OVERLOADED | Self::IS_BOOTSTRAPPING
        )
    }

    /// Whether a coordinator error code is a statement-level rejection.
    pub fn is_statement_error(code: i32) -> bool {
        matches!(
            code,
            Self::SYNTAX_ERROR | Self::INVALID | Self::ALREADY_EXISTS | Self::CONFIG_ERROR
        )
    }
}
