//! High-level CQL client for driver use.
//!
//! Wraps a [`CqlConnection`] and provides the request/response flows the
//! driver needs: the STARTUP/auth handshake, statement execution,
//! preparation, batches and event registration.

use std::collections::HashMap;

use crate::cql::message::{
    BatchQuery, EventBody, PreparedBody, QueryParameters, Request, Response, ResultBody,
};
use crate::cql::{CqlError, CqlResult};

use super::super::cluster::Auth;
use super::connection::CqlConnection;

/// Client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqlClientState {
    /// Connected, not yet started up
    New,
    /// Handshake completed
    Ready,
    /// Failed
    Failed,
    /// Closed
    Closed,
}

/// Outcome of a QUERY/EXECUTE/BATCH round trip.
#[derive(Debug)]
pub struct QueryOutcome {
    /// The RESULT body.
    pub body: ResultBody,
    /// Tracing session id, when tracing was requested.
    pub tracing_id: Option<uuid::Uuid>,
    /// Warnings attached by the coordinator.
    pub warnings: Vec<String>,
}

/// High-level CQL client.
pub struct CqlClient {
    connection: CqlConnection,
    state: CqlClientState,
}

impl CqlClient {
    /// Connect to a node. Performs TCP connection only; call
    /// [`startup`](Self::startup) before issuing statements.
    pub async fn connect(address: &str) -> CqlResult<Self> {
        let connection = CqlConnection::connect(address).await?;
        Ok(Self {
            connection,
            state: CqlClientState::New,
        })
    }

    /// Perform the STARTUP handshake, authenticating when the node asks.
    pub async fn startup(&mut self, auth: Option<&Auth>) -> CqlResult<()> {
        let startup = Request::Startup {
            options: crate::cql::message::startup_options(),
        };
        let frame = self.connection.request(&startup, false).await?;

        match Response::decode(&frame)? {
            Response::Ready => {
                self.connection.mark_ready();
                self.state = CqlClientState::Ready;
                Ok(())
            }
            Response::Authenticate { authenticator } => {
                let auth = auth.ok_or_else(|| {
                    CqlError::Authentication(format!(
                        "node requires authentication ({}) but no credentials were configured",
                        authenticator
                    ))
                })?;
                self.authenticate(auth).await
            }
            Response::Error(body) => {
                self.state = CqlClientState::Failed;
                Err(CqlError::Server {
                    code: body.code,
                    message: body.message,
                })
            }
            other => Err(CqlError::Protocol(format!(
                "unexpected response to STARTUP: {:?}",
                other.opcode()
            ))),
        }
    }

    /// SASL PLAIN exchange: a single AUTH_RESPONSE with the credentials.
    async fn authenticate(&mut self, auth: &Auth) -> CqlResult<()> {
        let mut token = Vec::with_capacity(auth.username.len() + auth.password.len() + 2);
        token.push(0);
        token.extend_from_slice(auth.username.as_bytes());
        token.push(0);
        token.extend_from_slice(auth.password.as_bytes());

        let frame = self
            .connection
            .request(&Request::AuthResponse { token }, false)
            .await?;

        match Response::decode(&frame)? {
            Response::AuthSuccess { .. } => {
                self.connection.mark_ready();
                self.state = CqlClientState::Ready;
                Ok(())
            }
            Response::AuthChallenge { .. } => {
                self.state = CqlClientState::Failed;
                Err(CqlError::Authentication(
                    "node issued an unsupported authentication challenge".into(),
                ))
            }
            Response::Error(body) => {
                self.state = CqlClientState::Failed;
                Err(CqlError::Authentication(body.message))
            }
            other => Err(CqlError::Protocol(format!(
                "unexpected response to AUTH_RESPONSE: {:?}",
                other.opcode()
            ))),
        }
    }

    /// Execute a QUERY request.
    pub async fn query(
        &mut self,
        query: &str,
        params: QueryParameters,
        tracing: bool,
    ) -> CqlResult<QueryOutcome> {
        self.ensure_ready()?;
        let request = Request::Query {
            query: query.to_string(),
            params,
        };
        let frame = self.connection.request(&request, tracing).await?;
        self.into_outcome(frame)
    }

    /// Execute an EXECUTE request against a prepared statement id.
    pub async fn execute(
        &mut self,
        id: &[u8],
        params: QueryParameters,
        tracing: bool,
    ) -> CqlResult<QueryOutcome> {
        self.ensure_ready()?;
        let request = Request::Execute {
            id: id.to_vec(),
            params,
        };
        let frame = self.connection.request(&request, tracing).await?;
        self.into_outcome(frame)
    }

    /// Prepare a statement on this node.
    pub async fn prepare(&mut self, query: &str) -> CqlResult<PreparedBody> {
        self.ensure_ready()?;
        let request = Request::Prepare {
            query: query.to_string(),
        };
        let frame = self.connection.request(&request, false).await?;
        match self.into_outcome(frame)?.body {
            ResultBody::Prepared(prepared) => Ok(prepared),
            other => Err(CqlError::Protocol(format!(
                "PREPARE returned a non-prepared result: {:?}",
                result_kind_name(&other)
            ))),
        }
    }

    /// Execute a BATCH request.
    pub async fn batch(
        &mut self,
        batch_type: u8,
        statements: Vec<BatchQuery>,
        consistency: u16,
        serial_consistency: Option<u16>,
        tracing: bool,
    ) -> CqlResult<QueryOutcome> {
        self.ensure_ready()?;
        let request = Request::Batch {
            batch_type,
            statements,
            consistency,
            serial_consistency,
        };
        let frame = self.connection.request(&request, tracing).await?;
        self.into_outcome(frame)
    }

    /// Register for server push events on this connection.
    pub async fn register(&mut self, events: Vec<String>) -> CqlResult<()> {
        self.ensure_ready()?;
        let frame = self
            .connection
            .request(&Request::Register { events }, false)
            .await?;
        match Response::decode(&frame)? {
            Response::Ready => Ok(()),
            Response::Error(body) => Err(CqlError::Server {
                code: body.code,
                message: body.message,
            }),
            other => Err(CqlError::Protocol(format!(
                "unexpected response to REGISTER: {:?}",
                other.opcode()
            ))),
        }
    }

    /// Query supported protocol options.
    pub async fn options(&mut self) -> CqlResult<HashMap<String, Vec<String>>> {
        let frame = self.connection.request(&Request::Options, false).await?;
        match Response::decode(&frame)? {
            Response::Supported { options } => Ok(options),
            Response::Error(body) => Err(CqlError::Server {
                code: body.code,
                message: body.message,
            }),
            other => Err(CqlError::Protocol(format!(
                "unexpected response to OPTIONS: {:?}",
                other.opcode()
            ))),
        }
    }

    /// Wait for the next pushed event on a registered connection.
    pub async fn recv_event(&mut self) -> CqlResult<EventBody> {
        self.ensure_ready()?;
        loop {
            let frame = self.connection.recv().await?;
            if let Response::Event(event) = Response::decode(&frame)? {
                return Ok(event);
            }
        }
    }

    /// Close the connection.
    pub async fn close(&mut self) {
        self.state = CqlClientState::Closed;
        self.connection.close().await;
    }

    /// Get the client state.
    pub fn state(&self) -> CqlClientState {
        self.state
    }

    /// Get the node address.
    pub fn address(&self) -> &str {
        self.connection.address()
    }

    /// Check if the client completed the handshake.
    pub fn is_ready(&self) -> bool {
        self.state == CqlClientState::Ready && self.connection.is_ready()
    }

    fn ensure_ready(&self) -> CqlResult<()> {
        match self.state {
            CqlClientState::Ready => Ok(()),
            CqlClientState::New => Err(CqlError::Protocol(
                "STARTUP handshake not completed".into(),
            )),
            CqlClientState::Failed => Err(CqlError::Protocol(
                "connection failed and must be replaced".into(),
            )),
            CqlClientState::Closed => Err(CqlError::ConnectionClosed),
        }
    }

    fn into_outcome(&mut self, frame: crate::cql::frame::Frame) -> CqlResult<QueryOutcome> {
        let tracing_id = frame.tracing_id;
        let warnings = frame.warnings.clone();
        match Response::decode(&frame)? {
            Response::Result(body) => Ok(QueryOutcome {
                body,
                tracing_id,
                warnings,
            }),
            Response::Error(body) => Err(CqlError::Server {
                code: body.code,
                message: body.message,
            }),
            other => Err(CqlError::Protocol(format!(
                "unexpected response opcode: {:?}",
                other.opcode()
            ))),
        }
    }
}

fn result_kind_name(body: &ResultBody) -> &'static str {
    match body {
        ResultBody::Void => "void",
        ResultBody::Rows(_) => "rows",
        ResultBody::SetKeyspace(_) => "set_keyspace",
        ResultBody::Prepared(_) => "prepared",
        ResultBody::SchemaChange(_) => "schema_change",
    }
}

impl std::fmt::Debug for CqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CqlClient")
            .field("address", &self.address())
            .field("state", &self.state)
            .finish()
    }
}
