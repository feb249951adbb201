//! Response messages.
//!
//! Decoding is what the driver needs; encoding exists so an in-process peer
//! (the test harness) can speak the server side of the protocol.

use std::collections::HashMap;
use std::net::IpAddr;

use bytes::{Bytes, BytesMut};

use super::super::codec::{decode_value, serialize_value};
use super::super::error::{CqlError, CqlResult, DbErrorCode};
use super::super::frame::{Frame, Opcode};
use super::super::types::ColumnType;
use super::super::value::CqlValue;
use super::super::wire::{self, Reader};

/// RESULT kind codes.
mod result_kind {
    pub const VOID: i32 = 0x0001;
    pub const ROWS: i32 = 0x0002;
    pub const SET_KEYSPACE: i32 = 0x0003;
    pub const PREPARED: i32 = 0x0004;
    pub const SCHEMA_CHANGE: i32 = 0x0005;
}

/// Rows metadata flag bits.
mod rows_flags {
    pub const GLOBAL_TABLES_SPEC: i32 = 0x0001;
    pub const HAS_MORE_PAGES: i32 = 0x0002;
    pub const NO_METADATA: i32 = 0x0004;
}

/// A column in result or prepared metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub typ: ColumnType,
}

/// A decoded page of rows.
#[derive(Debug, Clone, Default)]
pub struct RowsPage {
    /// Column specifications, in select order.
    pub columns: Vec<ColumnSpec>,
    /// Continuation token when the result has more pages.
    pub paging_state: Option<Vec<u8>>,
    /// Decoded row cells.
    pub rows: Vec<Vec<CqlValue>>,
}

/// The body of a RESULT/Prepared response.
#[derive(Debug, Clone)]
pub struct PreparedBody {
    /// Server-assigned statement id.
    pub id: Vec<u8>,
    /// Indices of the partition-key columns among the bind markers.
    pub pk_indices: Vec<u16>,
    /// Bind marker columns.
    pub bind_columns: Vec<ColumnSpec>,
    /// Result set columns.
    pub result_columns: Vec<ColumnSpec>,
}

/// Schema change payload (RESULT/SchemaChange and EVENT/SCHEMA_CHANGE).
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaChange {
    /// CREATED, UPDATED or DROPPED.
    pub change_type: String,
    /// KEYSPACE, TABLE, TYPE, FUNCTION or AGGREGATE.
    pub target: String,
    pub keyspace: String,
    /// Object name, absent for keyspace-level changes.
    pub name: Option<String>,
}

/// The body of a RESULT response.
#[derive(Debug, Clone)]
pub enum ResultBody {
    Void,
    Rows(RowsPage),
    SetKeyspace(String),
    Prepared(PreparedBody),
    SchemaChange(SchemaChange),
}

/// Typed extras attached to coordinator errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetails {
    None,
    Unavailable {
        consistency: u16,
        required: i32,
        alive: i32,
    },
    WriteTimeout {
        consistency: u16,
        received: i32,
        block_for: i32,
        write_type: String,
    },
    ReadTimeout {
        consistency: u16,
        received: i32,
        block_for: i32,
        data_present: bool,
    },
    AlreadyExists {
        keyspace: String,
        table: String,
    },
    Unprepared {
        id: Vec<u8>,
    },
}

/// An ERROR response body.
#[derive(Debug, Clone)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    pub details: ErrorDetails,
}

impl ErrorBody {
    /// Build an error without extras.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: ErrorDetails::None,
        }
    }

    /// Build an UNPREPARED error carrying the unknown statement id.
    pub fn unprepared(id: Vec<u8>, message: impl Into<String>) -> Self {
        Self {
            code: DbErrorCode::UNPREPARED,
            message: message.into(),
            details: ErrorDetails::Unprepared { id },
        }
    }
}

/// An EVENT body.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    TopologyChange {
        /// NEW_NODE or REMOVED_NODE.
        change: String,
        address: IpAddr,
        port: i32,
    },
    StatusChange {
        /// UP or DOWN.
        status: String,
        address: IpAddr,
        port: i32,
    },
    SchemaChange(SchemaChange),
}

/// A response message.
#[derive(Debug, Clone)]
pub enum Response {
    Ready,
    Authenticate { authenticator: String },
    AuthChallenge { token: Option<Vec<u8>> },
    AuthSuccess { token: Option<Vec<u8>> },
    Supported { options: HashMap<String, Vec<String>> },
    Error(ErrorBody),
    Result(ResultBody),
    Event(EventBody),
}

impl Response {
    /// The opcode for this response.
    pub fn opcode(&self) -> Opcode {
        match self {
            Response::Ready => Opcode::Ready,
            Response::Authenticate { .. } => Opcode::Authenticate,
            Response::AuthChallenge { .. } => Opcode::AuthChallenge,
            Response::AuthSuccess { .. } => Opcode::AuthSuccess,
            Response::Supported { .. } => Opcode::Supported,
            Response::Error(_) => Opcode::Error,
            Response::Result(_) => Opcode::Result,
            Response::Event(_) => Opcode::Event,
        }
    }

    /// Decode a response from a frame.
    pub fn decode(frame: &Frame) -> CqlResult<Response> {
        let mut r = Reader::new(&frame.body);
        let response = match frame.opcode {
            Opcode::Ready => Response::Ready,
            Opcode::Authenticate => Response::Authenticate {
                authenticator: r.string()?.to_string(),
            },
            Opcode::AuthChallenge => Response::AuthChallenge {
                token: r.bytes()?.map(|b| b.to_vec()),
            },
            Opcode::AuthSuccess => Response::AuthSuccess {
                token: r.bytes()?.map(|b| b.to_vec()),
            },
            Opcode::Supported => Response::Supported {
                options: r.string_multimap()?,
            },
            Opcode::Error => Response::Error(Self::decode_error(&mut r)?),
            Opcode::Result => Response::Result(Self::decode_result(&mut r)?),
            Opcode::Event => Response::Event(Self::decode_event(&mut r)?),
            other => {
                return Err(CqlError::Protocol(format!(
                    "opcode {:?} is not a response",
                    other
                )))
            }
        };
        Ok(response)
    }

    fn decode_error(r: &mut Reader<'_>) -> CqlResult<ErrorBody> {
        let code = r.int()?;
        let message = r.string()?.to_string();
        let details = match code {
            DbErrorCode::UNAVAILABLE => ErrorDetails::Unavailable {
                consistency: r.short()?,
                required: r.int()?,
                alive: r.int()?,
            },
            DbErrorCode::WRITE_TIMEOUT => ErrorDetails::WriteTimeout {
                consistency: r.short()?,
                received: r.int()?,
                block_for: r.int()?,
                write_type: r.string()?.to_string(),
            },
            DbErrorCode::READ_TIMEOUT => ErrorDetails::ReadTimeout {
                consistency: r.short()?,
                received: r.int()?,
                block_for: r.int()?,
                data_present: r.byte()? != 0,
            },
            DbErrorCode::ALREADY_EXISTS => ErrorDetails::AlreadyExists {
                keyspace: r.string()?.to_string(),
                table: r.string()?.to_string(),
            },
            DbErrorCode::UNPREPARED => ErrorDetails::Unprepared {
                id: r.short_bytes()?.to_vec(),
            },
            _ => ErrorDetails::None,
        };
        Ok(ErrorBody {
            code,
            message,
            details,
        })
    }

    fn decode_result(r: &mut Reader<'_>) -> CqlResult<ResultBody> {
        let kind = r.int()?;
        Ok(match kind {
            result_kind::VOID => ResultBody::Void,
            result_kind::ROWS => ResultBody::Rows(Self::decode_rows(r)?),
            result_kind::SET_KEYSPACE => ResultBody::SetKeyspace(r.string()?.to_string()),
            result_kind::PREPARED => ResultBody::Prepared(Self::decode_prepared(r)?),
            result_kind::SCHEMA_CHANGE => {
                ResultBody::SchemaChange(Self::decode_schema_change(r)?)
            }
            other => {
                return Err(CqlError::Protocol(format!(
                    "unknown result kind: {:#06x}",
                    other
                )))
            }
        })
    }

    fn decode_metadata(r: &mut Reader<'_>) -> CqlResult<(Vec<ColumnSpec>, Option<Vec<u8>>)> {
        let flags = r.int()?;
        let column_count = r.int()?;
        if column_count < 0 {
            return Err(CqlError::Protocol(format!(
                "negative column count: {}",
                column_count
            )));
        }
        let paging_state = if flags & rows_flags::HAS_MORE_PAGES != 0 {
            r.bytes()?.map(|b| b.to_vec())
        } else {
            None
        };
        if flags & rows_flags::NO_METADATA != 0 {
            return Err(CqlError::Protocol(
                "result metadata was skipped by the coordinator".to_string(),
            ));
        }
        let global = if flags & rows_flags::GLOBAL_TABLES_SPEC != 0 {
            let keyspace = r.string()?.to_string();
            let table = r.string()?.to_string();
            Some((keyspace, table))
        } else {
            None
        };
        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let (keyspace, table) = match &global {
                Some((ks, t)) => (ks.clone(), t.clone()),
                None => (r.string()?.to_string(), r.string()?.to_string()),
            };
            let name = r.string()?.to_string();
            let typ = ColumnType::from_reader(r)?;
            columns.push(ColumnSpec {
                keyspace,
                table,
                name,
                typ,
            });
        }
        Ok((columns, paging_state))
    }

    fn decode_rows(r: &mut Reader<'_>) -> CqlResult<RowsPage> {
        let (columns, paging_state) = Self::decode_metadata(r)?;
        let row_count = r.int()?;
        if row_count < 0 {
            return Err(CqlError::Protocol(format!(
                "negative row count: {}",
                row_count
            )));
        }
        let mut rows = Vec::with_capacity((row_count as usize).min(4096));
        for _ in 0..row_count {
            let mut cells = Vec::with_capacity(columns.len());
            for column in &columns {
                let cell = match r.bytes()? {
                    Some(body) => decode_value(body, &column.typ)?,
                    None => CqlValue::Null,
                };
                cells.push(cell);
            }
            rows.push(cells);
        }
        Ok(RowsPage {
            columns,
            paging_state,
            rows,
        })
    }

    fn decode_prepared(r: &mut Reader<'_>) -> CqlResult<PreparedBody> {
        let id = r.short_bytes()?.to_vec();

        // Bind-marker metadata carries the partition-key indices
        let flags = r.int()?;
        let column_count = r.int()?;
        let pk_count = r.int()?;
        if column_count < 0 || pk_count < 0 {
            return Err(CqlError::Protocol("negative prepared metadata count".into()));
        }
        let mut pk_indices = Vec::with_capacity(pk_count as usize);
        for _ in 0..pk_count {
            pk_indices.push(r.short()?);
        }
        let global = if flags & rows_flags::GLOBAL_TABLES_SPEC != 0 {
            let keyspace = r.string()?.to_string();
            let table = r.string()?.to_string();
            Some((keyspace, table))
        } else {
            None
        };
        let mut bind_columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let (keyspace, table) = match &global {
                Some((ks, t)) => (ks.clone(), t.clone()),
                None => (r.string()?.to_string(), r.string()?.to_string()),
            };
            let name = r.string()?.to_string();
            let typ = ColumnType::from_reader(r)?;
            bind_columns.push(ColumnSpec {
                keyspace,
                table,
                name,
                typ,
            });
        }

        let (result_columns, _) = Self::decode_metadata(r)?;
        Ok(PreparedBody {
            id,
            pk_indices,
            bind_columns,
            result_columns,
        })
    }

    fn decode_schema_change(r: &mut Reader<'_>) -> CqlResult<SchemaChange> {
        let change_type = r.string()?.to_string();
        let target = r.string()?.to_string();
        let keyspace = r.string()?.to_string();
        let name = if target == "KEYSPACE" {
            None
        } else {
            Some(r.string()?.to_string())
        };
        Ok(SchemaChange {
            change_type,
            target,
            keyspace,
            name,
        })
    }

    fn decode_event(r: &mut Reader<'_>) -> CqlResult<EventBody> {
        let event_type = r.string()?.to_string();
        Ok(match event_type.as_str() {
            "TOPOLOGY_CHANGE" => {
                let change = r.string()?.to_string();
                let (address, port) = r.inet()?;
                EventBody::TopologyChange {
                    change,
                    address,
                    port,
                }
            }
            "STATUS_CHANGE" => {
                let status = r.string()?.to_string();
                let (address, port) = r.inet()?;
                EventBody::StatusChange {
                    status,
                    address,
                    port,
                }
            }
            "SCHEMA_CHANGE" => EventBody::SchemaChange(Self::decode_schema_change(r)?),
            other => {
                return Err(CqlError::Protocol(format!(
                    "unknown event type: {}",
                    other
                )))
            }
        })
    }

    /// Encode the response body (server side of the symmetric codec).
    pub fn encode_body(&self) -> CqlResult<Bytes> {
        let mut dst = BytesMut::new();
        match self {
            Response::Ready => {}
            Response::Authenticate { authenticator } => {
                wire::put_string(&mut dst, authenticator)?;
            }
            Response::AuthChallenge { token } | Response::AuthSuccess { token } => {
                wire::put_bytes(&mut dst, token.as_deref())?;
            }
            Response::Supported { options } => {
                wire::put_string_multimap(&mut dst, options)?;
            }
            Response::Error(body) => {
                wire::put_int(&mut dst, body.code);
                wire::put_string(&mut dst, &body.message)?;
                match &body.details {
                    ErrorDetails::None => {}
                    ErrorDetails::Unavailable {
                        consistency,
                        required,
                        alive,
                    } => {
                        wire::put_short(&mut dst, *consistency);
                        wire::put_int(&mut dst, *required);
                        wire::put_int(&mut dst, *alive);
                    }
                    ErrorDetails::WriteTimeout {
                        consistency,
                        received,
                        block_for,
                        write_type,
                    } => {
                        wire::put_short(&mut dst, *consistency);
                        wire::put_int(&mut dst, *received);
                        wire::put_int(&mut dst, *block_for);
                        wire::put_string(&mut dst, write_type)?;
                    }
                    ErrorDetails::ReadTimeout {
                        consistency,
                        received,
                        block_for,
                        data_present,
                    } => {
                        wire::put_short(&mut dst, *consistency);
                        wire::put_int(&mut dst, *received);
                        wire::put_int(&mut dst, *block_for);
                        wire::put_byte(&mut dst, if *data_present { 1 } else { 0 });
                    }
                    ErrorDetails::AlreadyExists { keyspace, table } => {
                        wire::put_string(&mut dst, keyspace)?;
                        wire::put_string(&mut dst, table)?;
                    }
                    ErrorDetails::Unprepared { id } => {
                        wire::put_short_bytes(&mut dst, id)?;
                    }
                }
            }
            Response::Result(body) => match body {
                ResultBody::Void => {
                    wire::put_int(&mut dst, result_kind::VOID);
                }
                ResultBody::Rows(page) => {
                    wire::put_int(&mut dst, result_kind::ROWS);
                    Self::encode_rows(page, &mut dst)?;
                }
                ResultBody::SetKeyspace(keyspace) => {
                    wire::put_int(&mut dst, result_kind::SET_KEYSPACE);
                    wire::put_string(&mut dst, keyspace)?;
                }
                ResultBody::Prepared(prepared) => {
                    wire::put_int(&mut dst, result_kind::PREPARED);
                    wire::put_short_bytes(&mut dst, &prepared.id)?;
                    wire::put_int(&mut dst, 0);
                    wire::put_int(&mut dst, prepared.bind_columns.len() as i32);
                    wire::put_int(&mut dst, prepared.pk_indices.len() as i32);
                    for index in &prepared.pk_indices {
                        wire::put_short(&mut dst, *index);
                    }
                    for column in &prepared.bind_columns {
                        wire::put_string(&mut dst, &column.keyspace)?;
                        wire::put_string(&mut dst, &column.table)?;
                        wire::put_string(&mut dst, &column.name)?;
                        column.typ.write(&mut dst)?;
                    }
                    // Result metadata without paging
                    wire::put_int(&mut dst, 0);
                    wire::put_int(&mut dst, prepared.result_columns.len() as i32);
                    for column in &prepared.result_columns {
                        wire::put_string(&mut dst, &column.keyspace)?;
                        wire::put_string(&mut dst, &column.table)?;
                        wire::put_string(&mut dst, &column.name)?;
                        column.typ.write(&mut dst)?;
                    }
                }
                ResultBody::SchemaChange(change) => {
                    wire::put_int(&mut dst, result_kind::SCHEMA_CHANGE);
                    Self::encode_schema_change(change, &mut dst)?;
                }
            },
            Response::Event(event) => match event {
                EventBody::TopologyChange {
                    change,
                    address,
                    port,
                } => {
                    wire::put_string(&mut dst, "TOPOLOGY_CHANGE")?;
                    wire::put_string(&mut dst, change)?;
                    wire::put_inet(&mut dst, *address, *port);
                }
                EventBody::StatusChange {
                    status,
                    address,
                    port,
                } => {
                    wire::put_string(&mut dst, "STATUS_CHANGE")?;
                    wire::put_string(&mut dst, status)?;
                    wire::put_inet(&mut dst, *address, *port);
                }
                EventBody::SchemaChange(change) => {
                    wire::put_string(&mut dst, "SCHEMA_CHANGE")?;
                    Self::encode_schema_change(change, &mut dst)?;
                }
            },
        }
        Ok(dst.freeze())
    }

    fn encode_schema_change(change: &SchemaChange, dst: &mut BytesMut) -> CqlResult<()> {
        wire::put_string(dst, &change.change_type)?;
        wire::put_string(dst, &change.target)?;
        wire::put_string(dst, &change.keyspace)?;
        if let Some(name) = &change.name {
            wire::put_string(dst, name)?;
        }
        Ok(())
    }

    fn encode_rows(page: &RowsPage, dst: &mut BytesMut) -> CqlResult<()> {
        let mut flags = 0;
        if page.paging_state.is_some() {
            flags |= rows_flags::HAS_MORE_PAGES;
        }
        wire::put_int(dst, flags);
        wire::put_int(dst, page.columns.len() as i32);
        if let Some(paging_state) = &page.paging_state {
            wire::put_bytes(dst, Some(paging_state))?;
        }
        for column in &page.columns {
            wire::put_string(dst, &column.keyspace)?;
            wire::put_string(dst, &column.table)?;
            wire::put_string(dst, &column.name)?;
            column.typ.write(dst)?;
        }
        wire::put_int(dst, page.rows.len() as i32);
        for row in &page.rows {
            if row.len() != page.columns.len() {
                return Err(CqlError::Protocol(format!(
                    "row has {} cells, metadata has {} columns",
                    row.len(),
                    page.columns.len()
                )));
            }
            for (cell, column) in row.iter().zip(&page.columns) {
                let serialized = serialize_value(cell, &column.typ)?;
                wire::put_bytes(dst, serialized.as_deref())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(response: Response) -> Response {
        let body = response.encode_body().unwrap();
        let frame = Frame::response(response.opcode(), 0, None, body);
        Response::decode(&frame).unwrap()
    }

    fn int_column(name: &str) -> ColumnSpec {
        ColumnSpec {
            keyspace: "ks".into(),
            table: "t".into(),
            name: name.into(),
            typ: ColumnType::Int,
        }
    }

    #[test]
    fn test_ready_roundtrip() {
        assert!(matches!(roundtrip(Response::Ready), Response::Ready));
    }

    #[test]
    fn test_authenticate_roundtrip() {
        let decoded = roundtrip(Response::Authenticate {
            authenticator: "org.apache.cassandra.auth.PasswordAuthenticator".into(),
        });
        match decoded {
            Response::Authenticate { authenticator } => {
                assert!(authenticator.contains("PasswordAuthenticator"));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_rows_roundtrip() {
        let page = RowsPage {
            columns: vec![int_column("a"), int_column("b")],
            paging_state: Some(vec![1, 2, 3]),
            rows: vec![
                vec![CqlValue::Int(1), CqlValue::Int(2)],
                vec![CqlValue::Int(3), CqlValue::Null],
            ],
        };
        let decoded = roundtrip(Response::Result(ResultBody::Rows(page)));
        match decoded {
            Response::Result(ResultBody::Rows(page)) => {
                assert_eq!(page.columns.len(), 2);
                assert_eq!(page.paging_state, Some(vec![1, 2, 3]));
                assert_eq!(page.rows.len(), 2);
                assert_eq!(page.rows[0][0], CqlValue::Int(1));
                assert_eq!(page.rows[1][1], CqlValue::Null);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_prepared_roundtrip() {
        let prepared = PreparedBody {
            id: vec![0xAA, 0xBB],
            pk_indices: vec![0],
            bind_columns: vec![int_column("a"), int_column("b")],
            result_columns: vec![int_column("a")],
        };
        let decoded = roundtrip(Response::Result(ResultBody::Prepared(prepared)));
        match decoded {
            Response::Result(ResultBody::Prepared(prepared)) => {
                assert_eq!(prepared.id, vec![0xAA, 0xBB]);
                assert_eq!(prepared.pk_indices, vec![0]);
                assert_eq!(prepared.bind_columns.len(), 2);
                assert_eq!(prepared.result_columns.len(), 1);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_error_unprepared_roundtrip() {
        let decoded = roundtrip(Response::Error(ErrorBody::unprepared(
            vec![1, 2],
            "unknown statement",
        )));
        match decoded {
            Response::Error(body) => {
                assert_eq!(body.code, DbErrorCode::UNPREPARED);
                assert_eq!(body.details, ErrorDetails::Unprepared { id: vec![1, 2] });
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_error_unavailable_roundtrip() {
        let error = ErrorBody {
            code: DbErrorCode::UNAVAILABLE,
            message: "cannot achieve consistency".into(),
            details: ErrorDetails::Unavailable {
                consistency: 0x0004,
                required: 2,
                alive: 1,
            },
        };
        let decoded = roundtrip(Response::Error(error));
        match decoded {
            Response::Error(body) => {
                assert_eq!(
                    body.details,
                    ErrorDetails::Unavailable {
                        consistency: 0x0004,
                        required: 2,
                        alive: 1
                    }
                );
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_set_keyspace_roundtrip() {
        let decoded = roundtrip(Response::Result(ResultBody::SetKeyspace("basic".into())));
        assert!(
            matches!(decoded, Response::Result(ResultBody::SetKeyspace(ks)) if ks == "basic")
        );
    }

    #[test]
    fn test_schema_change_event_roundtrip() {
        let decoded = roundtrip(Response::Event(EventBody::SchemaChange(SchemaChange {
            change_type: "CREATED".into(),
            target: "TABLE".into(),
            keyspace: "ks".into(),
            name: Some("t".into()),
        })));
        match decoded {
            Response::Event(EventBody::SchemaChange(change)) => {
                assert_eq!(change.change_type, "CREATED");
                assert_eq!(change.name.as_deref(), Some("t"));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_status_change_event_roundtrip() {
        let decoded = roundtrip(Response::Event(EventBody::StatusChange {
            status: "DOWN".into(),
            address: "10.0.0.2".parse().unwrap(),
            port: 9042,
        }));
        match decoded {
            Response::Event(EventBody::StatusChange { status, port, .. }) => {
                assert_eq!(status, "DOWN");
                assert_eq!(port, 9042);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_body_is_error() {
        let frame = Frame::response(Opcode::Result, 0, None, Bytes::from_static(&[0, 0]));
        assert!(Response::decode(&frame).is_err());
    }
}
