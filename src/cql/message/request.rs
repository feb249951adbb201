//! Request messages.
//!
//! Each request knows its opcode and how to encode its body. The decode
//! direction exists so an in-process peer (the test harness) can read what
//! the driver sends.

use bytes::{Bytes, BytesMut};

use super::super::error::{CqlError, CqlResult};
use super::super::frame::Opcode;
use super::super::wire::{self, Reader};

/// STARTUP option key: CQL version.
pub const OPT_CQL_VERSION: &str = "CQL_VERSION";
/// STARTUP option key: driver name.
pub const OPT_DRIVER_NAME: &str = "DRIVER_NAME";
/// STARTUP option key: driver version.
pub const OPT_DRIVER_VERSION: &str = "DRIVER_VERSION";

/// CQL version announced in STARTUP.
pub const CQL_VERSION: &str = "3.0.0";

/// Event type names for REGISTER.
pub const EVENT_TOPOLOGY_CHANGE: &str = "TOPOLOGY_CHANGE";
pub const EVENT_STATUS_CHANGE: &str = "STATUS_CHANGE";
pub const EVENT_SCHEMA_CHANGE: &str = "SCHEMA_CHANGE";

/// Query parameter flag bits.
mod query_flags {
    pub const VALUES: u8 = 0x01;
    pub const PAGE_SIZE: u8 = 0x04;
    pub const WITH_PAGING_STATE: u8 = 0x08;
    pub const WITH_SERIAL_CONSISTENCY: u8 = 0x10;
}

/// Parameters attached to QUERY and EXECUTE requests.
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    /// Consistency wire code.
    pub consistency: u16,
    /// Bound values, already serialized (None is a null value).
    pub values: Vec<Option<Vec<u8>>>,
    /// Requested page size.
    pub page_size: Option<i32>,
    /// Continuation token from a previous page.
    pub paging_state: Option<Vec<u8>>,
    /// Serial consistency wire code, for conditional statements.
    pub serial_consistency: Option<u16>,
}

impl QueryParameters {
    fn encode(&self, dst: &mut BytesMut) -> CqlResult<()> {
        wire::put_short(dst, self.consistency);

        let mut flags = 0u8;
        if !self.values.is_empty() {
            flags |= query_flags::VALUES;
        }
        if self.page_size.is_some() {
            flags |= query_flags::PAGE_SIZE;
        }
        if self.paging_state.is_some() {
            flags |= query_flags::WITH_PAGING_STATE;
        }
        if self.serial_consistency.is_some() {
            flags |= query_flags::WITH_SERIAL_CONSISTENCY;
        }
        wire::put_byte(dst, flags);

        if !self.values.is_empty() {
            if self.values.len() > u16::MAX as usize {
                return Err(CqlError::Protocol(format!(
                    "too many bound values: {}",
                    self.values.len()
                )));
            }
            wire::put_short(dst, self.values.len() as u16);
            for value in &self.values {
                wire::put_bytes(dst, value.as_deref())?;
            }
        }
        if let Some(page_size) = self.page_size {
            wire::put_int(dst, page_size);
        }
        if let Some(paging_state) = &self.paging_state {
            wire::put_bytes(dst, Some(paging_state))?;
        }
        if let Some(serial) = self.serial_consistency {
            wire::put_short(dst, serial);
        }
        Ok(())
    }

    fn decode(r: &mut Reader<'_>) -> CqlResult<Self> {
        let consistency = r.short()?;
        let flags = r.byte()?;

        let mut values = Vec::new();
        if flags & query_flags::VALUES != 0 {
            let n = r.short()? as usize;
            for _ in 0..n {
                values.push(r.bytes()?.map(|b| b.to_vec()));
            }
        }
        let page_size = if flags & query_flags::PAGE_SIZE != 0 {
            Some(r.int()?)
        } else {
            None
        };
        let paging_state = if flags & query_flags::WITH_PAGING_STATE != 0 {
            r.bytes()?.map(|b| b.to_vec())
        } else {
            None
        };
        let serial_consistency = if flags & query_flags::WITH_SERIAL_CONSISTENCY != 0 {
            Some(r.short()?)
        } else {
            None
        };

        Ok(Self {
            consistency,
            values,
            page_size,
            paging_state,
            serial_consistency,
        })
    }
}

/// One statement inside a BATCH request.
#[derive(Debug, Clone)]
pub enum BatchQuery {
    /// Raw CQL text with serialized values.
    Simple {
        query: String,
        values: Vec<Option<Vec<u8>>>,
    },
    /// Server-assigned statement id with serialized values.
    Prepared {
        id: Vec<u8>,
        values: Vec<Option<Vec<u8>>>,
    },
}

/// A request message.
#[derive(Debug, Clone)]
pub enum Request {
    Startup {
        options: Vec<(String, String)>,
    },
    AuthResponse {
        token: Vec<u8>,
    },
    Options,
    Query {
        query: String,
        params: QueryParameters,
    },
    Prepare {
        query: String,
    },
    Execute {
        id: Vec<u8>,
        params: QueryParameters,
    },
    Batch {
        batch_type: u8,
        statements: Vec<BatchQuery>,
        consistency: u16,
        serial_consistency: Option<u16>,
    },
    Register {
        events: Vec<String>,
    },
}

impl Request {
    /// The opcode for this request.
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Startup { .. } => Opcode::Startup,
            Request::AuthResponse { .. } => Opcode::AuthResponse,
            Request::Options => Opcode::Options,
            Request::Query { .. } => Opcode::Query,
            Request::Prepare { .. } => Opcode::Prepare,
            Request::Execute { .. } => Opcode::Execute,
            Request::Batch { .. } => Opcode::Batch,
            Request::Register { .. } => Opcode::Register,
        }
    }

    /// Encode the request body.
    pub fn encode_body(&self) -> CqlResult<Bytes> {
        let mut dst = BytesMut::new();
        match self {
            Request::Startup { options } => {
                wire::put_string_map(
                    &mut dst,
                    options.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                    options.len(),
                )?;
            }
            Request::AuthResponse { token } => {
                wire::put_bytes(&mut dst, Some(token))?;
            }
            Request::Options => {}
            Request::Query { query, params } => {
                wire::put_long_string(&mut dst, query)?;
                params.encode(&mut dst)?;
            }
            Request::Prepare { query } => {
                wire::put_long_string(&mut dst, query)?;
            }
            Request::Execute { id, params } => {
                wire::put_short_bytes(&mut dst, id)?;
                params.encode(&mut dst)?;
            }
            Request::Batch {
                batch_type,
                statements,
                consistency,
                serial_consistency,
            } => {
                wire::put_byte(&mut dst, *batch_type);
                if statements.len() > u16::MAX as usize {
                    return Err(CqlError::Protocol(format!(
                        "too many batch statements: {}",
                        statements.len()
                    )));
                }
                wire::put_short(&mut dst, statements.len() as u16);
                for statement in statements {
                    let values = match statement {
                        BatchQuery::Simple { query, values } => {
                            wire::put_byte(&mut dst, 0);
                            wire::put_long_string(&mut dst, query)?;
                            values
                        }
                        BatchQuery::Prepared { id, values } => {
                            wire::put_byte(&mut dst, 1);
                            wire::put_short_bytes(&mut dst, id)?;
                            values
                        }
                    };
                    wire::put_short(&mut dst, values.len() as u16);
                    for value in values {
                        wire::put_bytes(&mut dst, value.as_deref())?;
                    }
                }
                wire::put_short(&mut dst, *consistency);
                let mut flags = 0u8;
                if serial_consistency.is_some() {
                    flags |= query_flags::WITH_SERIAL_CONSISTENCY;
                }
                wire::put_byte(&mut dst, flags);
                if let Some(serial) = serial_consistency {
                    wire::put_short(&mut dst, *serial);
                }
            }
            Request::Register { events } => {
                wire::put_string_list(&mut dst, events)?;
            }
        }
        Ok(dst.freeze())
    }

    /// Decode a request body, given the frame opcode.
    pub fn decode_body(opcode: Opcode, body: &[u8]) -> CqlResult<Request> {
        let mut r = Reader::new(body);
        let request = match opcode {
            Opcode::Startup => {
                let map = r.string_map()?;
                Request::Startup {
                    options: map.into_iter().collect(),
                }
            }
            Opcode::AuthResponse => {
                let token = r.bytes()?.map(|b| b.to_vec()).unwrap_or_default();
                Request::AuthResponse { token }
            }
            Opcode::Options => Request::Options,
            Opcode::Query => {
                let query = r.long_string()?.to_string();
                let params = QueryParameters::decode(&mut r)?;
                Request::Query { query, params }
            }
            Opcode::Prepare => Request::Prepare {
                query: r.long_string()?.to_string(),
            },
            Opcode::Execute => {
                let id = r.short_bytes()?.to_vec();
                let params = QueryParameters::decode(&mut r)?;
                Request::Execute { id, params }
            }
            Opcode::Batch => {
                let batch_type = r.byte()?;
                let n = r.short()? as usize;
                let mut statements = Vec::with_capacity(n);
                for _ in 0..n {
                    let kind = r.byte()?;
                    let statement = match kind {
                        0 => {
                            let query = r.long_string()?.to_string();
                            let values = Self::decode_values(&mut r)?;
                            BatchQuery::Simple { query, values }
                        }
                        1 => {
                            let id = r.short_bytes()?.to_vec();
                            let values = Self::decode_values(&mut r)?;
                            BatchQuery::Prepared { id, values }
                        }
                        other => {
                            return Err(CqlError::Protocol(format!(
                                "invalid batch statement kind: {}",
                                other
                            )))
                        }
                    };
                    statements.push(statement);
                }
                let consistency = r.short()?;
                let flags = r.byte()?;
                let serial_consistency = if flags & query_flags::WITH_SERIAL_CONSISTENCY != 0 {
                    Some(r.short()?)
                } else {
                    None
                };
                Request::Batch {
                    batch_type,
                    statements,
                    consistency,
                    serial_consistency,
                }
            }
            Opcode::Register => Request::Register {
                events: r.string_list()?,
            },
            other => {
                return Err(CqlError::Protocol(format!(
                    "opcode {:?} is not a request",
                    other
                )))
            }
        };
        Ok(request)
    }

    fn decode_values(r: &mut Reader<'_>) -> CqlResult<Vec<Option<Vec<u8>>>> {
        let n = r.short()? as usize;
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(r.bytes()?.map(|b| b.to_vec()));
        }
        Ok(values)
    }
}

/// Build the standard STARTUP options for this driver.
pub fn startup_options() -> Vec<(String, String)> {
    vec![
        (OPT_CQL_VERSION.to_string(), CQL_VERSION.to_string()),
        (
            OPT_DRIVER_NAME.to_string(),
            "basalt-driver".to_string(),
        ),
        (
            OPT_DRIVER_VERSION.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
    ]
}
