//! Driver Error Types
//!
//! 드라이버 에러 정의

use std::io;
use thiserror::Error;

use crate::cql::{CodecError, CqlError, DbErrorCode};

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 클러스터 연결 실패 (치명적)
    #[error("Connect error: {0}")]
    Connect(String),

    /// 연결 에러 (일시적, 재시도 대상)
    #[error("Connection error: {0}")]
    Connection(String),

    /// 인증 에러
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// 인코딩 에러 (로컬, 재시도 불가)
    #[error("Encoding error: {0}")]
    Encoding(CodecError),

    /// 디코딩 에러 (로컬, 재시도 불가)
    #[error("Decoding error: {0}")]
    Decoding(CodecError),

    /// PREPARE 거부
    #[error("Prepare error {code:#06x}: {message}")]
    Prepare { code: i32, message: String },

    /// 실행 에러 (코디네이터 보고)
    #[error("Execution error {code:#06x}: {message}")]
    Exec { code: i32, message: String },

    /// 클라이언트 측 타임아웃
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 풀 에러
    #[error("Pool error: {0}")]
    Pool(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 세션 에러
    #[error("Session error: {0}")]
    Session(String),

    /// 프로토콜 에러
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// 연결 실패 에러 생성
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 인증 에러 생성
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// 실행 에러 생성
    pub fn exec(code: i32, message: impl Into<String>) -> Self {
        Self::Exec {
            code,
            message: message.into(),
        }
    }

    /// PREPARE 에러 생성
    pub fn prepare(code: i32, message: impl Into<String>) -> Self {
        Self::Prepare {
            code,
            message: message.into(),
        }
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 풀 에러 생성
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 세션 에러 생성
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Io(_) => true,
            Self::Exec { code, .. } => DbErrorCode::is_transient(*code),
            _ => false,
        }
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_)
                | Self::Configuration(_)
                | Self::Encoding(_)
                | Self::Decoding(_)
                | Self::Session(_)
        )
    }

    /// UNPREPARED 응답 여부
    pub fn is_unprepared(&self) -> bool {
        matches!(self, Self::Exec { code, .. } if *code == DbErrorCode::UNPREPARED)
    }
}

/// 프로토콜 에러를 드라이버 에러로 분류
impl From<CqlError> for DriverError {
    fn from(err: CqlError) -> Self {
        match err {
            CqlError::Io(e) => DriverError::Connection(e.to_string()),
            CqlError::ConnectionClosed => {
                DriverError::Connection("connection closed by the node".to_string())
            }
            CqlError::Authentication(msg) => DriverError::Authentication(msg),
            CqlError::Server { code, message } => {
                if code == DbErrorCode::AUTH_ERROR || code == DbErrorCode::UNAUTHORIZED {
                    DriverError::Authentication(message)
                } else {
                    DriverError::Exec { code, message }
                }
            }
            CqlError::Codec(e) => DriverError::Decoding(e),
            CqlError::Wire(e) => DriverError::Protocol(e.to_string()),
            other => DriverError::Protocol(other.to_string()),
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================
