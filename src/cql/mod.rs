//! # CQL Native Protocol Implementation
//!
//! Low-level CQL native protocol (v4) client implementation for
//! communication with CQL-compatible column-store clusters.
//!
//! ## Overview
//!
//! The native protocol is a binary protocol used for efficient
//! communication between clients and cluster nodes. This module provides:
//!
//! - **Wire notation** - Primitive elements ([short], [string], [bytes], …)
//! - **Type codec** - Typed value serialization for every CQL column type
//! - **Message Types** - Request/response message handling
//! - **Framing** - Async frame codec for Tokio
//!
//! ## Submodules
//!
//! - [`wire`] - Primitive notation reader/writer
//! - [`types`] - Column types and their wire option ids
//! - [`value`] - The CQL value union
//! - [`codec`] - Typed value encoder/decoder
//! - [`message`] - Request and response messages
//! - [`frame`] - Frame header and Tokio codec
//! - [`error`] - Protocol error types
//!
//! ## Note
//!
//! Most users should use the high-level [`crate::driver`] module instead of
//! interacting with the protocol directly.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod types;
pub mod value;
pub mod wire;

pub use codec::{decode_value, encode_value, serialize_value, CodecError};
pub use error::{CqlError, CqlResult, DbErrorCode};
pub use frame::{Frame, FrameCodec, Opcode, PROTOCOL_VERSION};
pub use message::{
    ColumnSpec, ErrorBody, ErrorDetails, EventBody, PreparedBody, QueryParameters, Request,
    Response, ResultBody, RowsPage, SchemaChange,
};
pub use types::ColumnType;
pub use value::{CqlDecimal, CqlDuration, CqlValue, CqlVarint};
pub use wire::WireError;
