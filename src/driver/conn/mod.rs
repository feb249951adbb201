//! CQL protocol client glue for the driver.
//!
//! This module provides the client-side transport on top of the protocol
//! layer in [`crate::cql`]: a framed TCP connection and a high-level client
//! exposing the handshake and request flows.
//!
//! # Architecture
//!
//! ```text
//! Session / ConnectionManager
//!   └── CqlClient
//!         ├── CqlConnection (TCP + framing)
//!         │     └── FrameCodec (from the protocol module)
//!         └── Message types (from the protocol module)
//! ```

pub mod client;
pub mod connection;

pub use client::{CqlClient, CqlClientState, QueryOutcome};
pub use connection::{CqlConnection, CqlConnectionState};
