//! In-process mock cluster node.
//!
//! Speaks the CQL native protocol over a real TCP socket using the crate's
//! symmetric frame and message codecs, with a tiny table engine that is just
//! enough for INSERT/SELECT over one pre-declared table, the system tables
//! the driver reads during topology refresh, and optional tracing rows.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder};

use basalt_driver::cql::frame::{Frame, FrameCodec};
use basalt_driver::cql::message::{
    BatchQuery, ColumnSpec, ErrorBody, ErrorDetails, PreparedBody, QueryParameters, Request,
    Response, ResultBody, RowsPage,
};
use basalt_driver::cql::{decode_value, ColumnType, CqlValue, DbErrorCode};
use basalt_driver::Consistency;

/// Schema of the single mock table.
#[derive(Debug, Clone)]
pub struct MockTable {
    pub keyspace: String,
    pub name: String,
    pub columns: Vec<(String, ColumnType)>,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
}

impl MockTable {
    /// The `basic(a int, b int, c text, primary key (a, b))` table used by
    /// most scenarios.
    pub fn basic() -> Self {
        Self {
            keyspace: "basic".into(),
            name: "basic".into(),
            columns: vec![
                ("a".into(), ColumnType::Int),
                ("b".into(), ColumnType::Int),
                ("c".into(), ColumnType::Text),
            ],
            partition_key: vec!["a".into()],
            clustering_key: vec!["b".into()],
        }
    }

    fn column_type(&self, name: &str) -> Option<&ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    fn spec(&self, name: &str, typ: ColumnType) -> ColumnSpec {
        ColumnSpec {
            keyspace: self.keyspace.clone(),
            table: self.name.clone(),
            name: name.into(),
            typ,
        }
    }
}

/// Behavior switches for failure simulation.
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Require PLAIN authentication with these credentials.
    pub auth: Option<(String, String)>,
    /// Delay every QUERY/EXECUTE response.
    pub response_delay: Option<Duration>,
    /// Simulated number of alive replicas (replication factor 3); requests
    /// needing more acks answer UNAVAILABLE.
    pub alive_replicas: Option<i32>,
    /// Serve canned system_traces rows for traced requests.
    pub tracing_rows: bool,
}

/// Shared observable state, also usable across several nodes.
#[derive(Default)]
pub struct MockState {
    /// Stored rows, in insertion order.
    rows: Mutex<Vec<HashMap<String, CqlValue>>>,
    /// Prepared statements by id.
    prepared: Mutex<HashMap<Vec<u8>, String>>,
    /// Ids that will answer UNPREPARED once.
    forgotten: Mutex<Vec<Vec<u8>>>,
    /// Number of PREPARE requests served.
    prepare_count: AtomicU64,
    /// Consistency code of every QUERY/EXECUTE/BATCH received.
    consistencies: Mutex<Vec<u16>>,
    next_prepared_id: AtomicU64,
}

impl MockState {
    pub fn rows(&self) -> Vec<HashMap<String, CqlValue>> {
        self.rows.lock().clone()
    }

    pub fn recorded_consistencies(&self) -> Vec<u16> {
        self.consistencies.lock().clone()
    }

    pub fn prepare_count(&self) -> u64 {
        self.prepare_count.load(Ordering::Relaxed)
    }

    /// Make every known prepared id answer UNPREPARED on its next use.
    pub fn forget_prepared(&self) {
        let known: Vec<Vec<u8>> = self.prepared.lock().keys().cloned().collect();
        *self.forgotten.lock() = known;
    }
}

/// A running mock node.
pub struct MockNode {
    address: std::net::SocketAddr,
    pub state: Arc<MockState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockNode {
    /// Start a node serving the given table with default options.
    pub async fn start(table: MockTable) -> Self {
        Self::start_with(table, MockOptions::default(), Arc::new(MockState::default())).await
    }

    /// Start a node with explicit options and (possibly shared) state.
    pub async fn start_with(table: MockTable, options: MockOptions, state: Arc<MockState>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock node");
        let address = listener.local_addr().expect("mock node address");

        let accept_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let conn_state = Arc::clone(&accept_state);
                let conn_table = table.clone();
                let conn_options = options.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, conn_table, conn_options, conn_state).await;
                });
            }
        });

        Self {
            address,
            state,
            handle,
        }
    }

    /// "host:port" of this node.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.address.port())
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Reserve an address where nothing is listening (bind then drop).
pub async fn unreachable_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind throwaway listener");
    let address = listener.local_addr().expect("throwaway address");
    drop(listener);
    format!("127.0.0.1:{}", address.port())
}

async fn serve_connection(
    mut stream: TcpStream,
    table: MockTable,
    options: MockOptions,
    state: Arc<MockState>,
) -> std::io::Result<()> {
    let mut codec = FrameCodec::server();
    let mut read_buffer = BytesMut::with_capacity(8192);
    let mut authenticated = options.auth.is_none();

    loop {
        let frame = loop {
            match codec.decode(&mut read_buffer) {
                Ok(Some(frame)) => break frame,
                Ok(None) => {
                    if stream.read_buf(&mut read_buffer).await? == 0 {
                        return Ok(());
                    }
                }
                Err(_) => return Ok(()),
            }
        };

        let request = match Request::decode_body(frame.opcode, &frame.body) {
            Ok(request) => request,
            Err(e) => {
                let response = Response::Error(ErrorBody::new(
                    DbErrorCode::PROTOCOL_ERROR,
                    format!("undecodable request: {}", e),
                ));
                write_response(&mut stream, &mut codec, frame.stream, None, response).await?;
                continue;
            }
        };

        if matches!(
            request,
            Request::Query { .. } | Request::Execute { .. } | Request::Batch { .. }
        ) {
            if let Some(delay) = options.response_delay {
                tokio::time::sleep(delay).await;
            }
        }

        let tracing_id = if frame.tracing {
            Some(uuid::Uuid::new_v4())
        } else {
            None
        };

        let response = handle_request(request, &table, &options, &state, &mut authenticated);
        write_response(&mut stream, &mut codec, frame.stream, tracing_id, response).await?;
    }
}

async fn write_response(
    stream: &mut TcpStream,
    codec: &mut FrameCodec,
    stream_id: i16,
    tracing_id: Option<uuid::Uuid>,
    response: Response,
) -> std::io::Result<()> {
    let body = response.encode_body().expect("encode mock response");
    let frame = Frame::response(response.opcode(), stream_id, tracing_id, body);
    let mut out = BytesMut::new();
    codec.encode(frame, &mut out).expect("frame mock response");
    stream.write_all(&out).await?;
    stream.flush().await
}

fn handle_request(
    request: Request,
    table: &MockTable,
    options: &MockOptions,
    state: &MockState,
    authenticated: &mut bool,
) -> Response {
    match request {
        Request::Startup { .. } => {
            if *authenticated {
                Response::Ready
            } else {
                Response::Authenticate {
                    authenticator: "org.apache.cassandra.auth.PasswordAuthenticator".into(),
                }
            }
        }
        Request::AuthResponse { token } => {
            let Some((user, pass)) = &options.auth else {
                return Response::Error(ErrorBody::new(
                    DbErrorCode::PROTOCOL_ERROR,
                    "unexpected AUTH_RESPONSE",
                ));
            };
            let expected = {
                let mut t = vec![0u8];
                t.extend_from_slice(user.as_bytes());
                t.push(0);
                t.extend_from_slice(pass.as_bytes());
                t
            };
            if token == expected {
                *authenticated = true;
                Response::AuthSuccess { token: None }
            } else {
                Response::Error(ErrorBody::new(
                    DbErrorCode::AUTH_ERROR,
                    "bad credentials",
                ))
            }
        }
        Request::Options => Response::Supported {
            options: HashMap::from([("CQL_VERSION".to_string(), vec!["3.0.0".to_string()])]),
        },
        Request::Register { .. } => Response::Ready,
        Request::Prepare { query } => {
            state.prepare_count.fetch_add(1, Ordering::Relaxed);
            let id = state
                .next_prepared_id
                .fetch_add(1, Ordering::Relaxed)
                .to_be_bytes()
                .to_vec();
            state.prepared.lock().insert(id.clone(), query.clone());

            let bind_columns = bind_columns_for(&query, table);
            let pk_indices = bind_columns
                .iter()
                .enumerate()
                .filter(|(_, spec)| table.partition_key.contains(&spec.name))
                .map(|(i, _)| i as u16)
                .collect();

            Response::Result(ResultBody::Prepared(PreparedBody {
                id,
                pk_indices,
                bind_columns,
                result_columns: Vec::new(),
            }))
        }
        Request::Query { query, params } => {
            state.consistencies.lock().push(params.consistency);
            if let Some(unavailable) = check_unavailable(options, params.consistency) {
                return unavailable;
            }
            run_cql(&query, &params, table, options, state)
        }
        Request::Execute { id, params } => {
            state.consistencies.lock().push(params.consistency);
            if let Some(unavailable) = check_unavailable(options, params.consistency) {
                return unavailable;
            }
            {
                let mut forgotten = state.forgotten.lock();
                if let Some(position) = forgotten.iter().position(|f| f == &id) {
                    forgotten.remove(position);
                    return Response::Error(ErrorBody::unprepared(
                        id,
                        "prepared statement not found on this node",
                    ));
                }
            }
            let Some(query) = state.prepared.lock().get(&id).cloned() else {
                return Response::Error(ErrorBody::unprepared(id, "unknown statement id"));
            };
            run_cql(&query, &params, table, options, state)
        }
        Request::Batch {
            statements,
            consistency,
            ..
        } => {
            state.consistencies.lock().push(consistency);
            if let Some(unavailable) = check_unavailable(options, consistency) {
                return unavailable;
            }
            for statement in statements {
                let (query, values) = match statement {
                    BatchQuery::Simple { query, values } => (query, values),
                    BatchQuery::Prepared { id, values } => {
                        let Some(query) = state.prepared.lock().get(&id).cloned() else {
                            return Response::Error(ErrorBody::unprepared(
                                id,
                                "unknown statement id",
                            ));
                        };
                        (query, values)
                    }
                };
                let params = QueryParameters {
                    consistency,
                    values,
                    ..Default::default()
                };
                let response = run_cql(&query, &params, table, options, state);
                if matches!(response, Response::Error(_)) {
                    return response;
                }
            }
            Response::Result(ResultBody::Void)
        }
    }
}

fn check_unavailable(options: &MockOptions, consistency: u16) -> Option<Response> {
    let alive = options.alive_replicas?;
    let required = Consistency::from_code(consistency)
        .map(|c| c.required_acks(3) as i32)
        .unwrap_or(1);
    if required > alive {
        Some(Response::Error(ErrorBody {
            code: DbErrorCode::UNAVAILABLE,
            message: format!("cannot achieve consistency ({} > {})", required, alive),
            details: ErrorDetails::Unavailable {
                consistency,
                required,
                alive,
            },
        }))
    } else {
        None
    }
}

/// Bind-marker column specs for a statement, by position of `?` markers.
fn bind_columns_for(query: &str, table: &MockTable) -> Vec<ColumnSpec> {
    if let Some((columns, values)) = parse_insert_shape(query) {
        return columns
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.trim() == "?")
            .map(|(name, _)| {
                let typ = table
                    .column_type(name)
                    .cloned()
                    .unwrap_or(ColumnType::Blob);
                table.spec(name, typ)
            })
            .collect();
    }
    // Non-INSERT statements get untyped markers
    query
        .matches('?')
        .enumerate()
        .map(|(i, _)| table.spec(&format!("arg{}", i), ColumnType::Blob))
        .collect()
}

/// Split `INSERT INTO t (a, b) VALUES (x, y)` into column and value lists.
fn parse_insert_shape(query: &str) -> Option<(Vec<String>, Vec<String>)> {
    let upper = query.to_ascii_uppercase();
    if !upper.trim_start().starts_with("INSERT") {
        return None;
    }
    let columns_start = query.find('(')?;
    let columns_end = query[columns_start..].find(')')? + columns_start;
    let columns: Vec<String> = query[columns_start + 1..columns_end]
        .split(',')
        .map(|c| c.trim().to_string())
        .collect();

    let values_keyword = upper.find("VALUES")?;
    let values_start = query[values_keyword..].find('(')? + values_keyword;
    let values_end = query.rfind(')')?;
    let values: Vec<String> = query[values_start + 1..values_end]
        .split(',')
        .map(|v| v.trim().to_string())
        .collect();

    if columns.len() != values.len() {
        return None;
    }
    Some((columns, values))
}

fn run_cql(
    query: &str,
    params: &QueryParameters,
    table: &MockTable,
    options: &MockOptions,
    state: &MockState,
) -> Response {
    let trimmed = query.trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("USE ") {
        let keyspace = trimmed[4..].trim().trim_matches('"').to_string();
        return Response::Result(ResultBody::SetKeyspace(keyspace));
    }

    if upper.contains("FROM SYSTEM.LOCAL") {
        return system_local(&upper, table);
    }
    if upper.contains("FROM SYSTEM.PEERS") {
        return rows_response(Vec::new(), vec![], None);
    }
    if upper.contains("FROM SYSTEM_SCHEMA.KEYSPACES") {
        return system_keyspaces(table);
    }
    if upper.contains("FROM SYSTEM_SCHEMA.TABLES") {
        return system_tables(table);
    }
    if upper.contains("FROM SYSTEM_SCHEMA.COLUMNS") {
        return system_columns(table);
    }
    if upper.contains("FROM SYSTEM_TRACES.SESSIONS") {
        return traces_sessions(options, table);
    }
    if upper.contains("FROM SYSTEM_TRACES.EVENTS") {
        return traces_events(options, table);
    }

    if upper.starts_with("INSERT") {
        return run_insert(trimmed, params, table, state);
    }
    if upper.starts_with("SELECT") {
        return run_select(trimmed, params, table, state);
    }
    if upper.starts_with("CREATE") || upper.starts_with("DELETE") || upper.starts_with("TRUNCATE") {
        return Response::Result(ResultBody::Void);
    }

    Response::Error(ErrorBody::new(
        DbErrorCode::SYNTAX_ERROR,
        format!("mock node cannot parse: {}", query),
    ))
}

fn run_insert(
    query: &str,
    params: &QueryParameters,
    table: &MockTable,
    state: &MockState,
) -> Response {
    let Some((columns, values)) = parse_insert_shape(query) else {
        return Response::Error(ErrorBody::new(
            DbErrorCode::SYNTAX_ERROR,
            "malformed INSERT",
        ));
    };

    let mut bound = params.values.iter();
    let mut row = HashMap::new();
    for (column, literal) in columns.iter().zip(&values) {
        let Some(typ) = table.column_type(column) else {
            return Response::Error(ErrorBody::new(
                DbErrorCode::INVALID,
                format!("unknown column {}", column),
            ));
        };
        let value = if literal == "?" {
            match bound.next() {
                Some(Some(bytes)) => match decode_value(bytes, typ) {
                    Ok(value) => value,
                    Err(e) => {
                        return Response::Error(ErrorBody::new(
                            DbErrorCode::INVALID,
                            format!("cannot decode bound value for {}: {}", column, e),
                        ))
                    }
                },
                _ => CqlValue::Null,
            }
        } else {
            match parse_literal(literal, typ) {
                Some(value) => value,
                None => {
                    return Response::Error(ErrorBody::new(
                        DbErrorCode::SYNTAX_ERROR,
                        format!("cannot parse literal {} for {}", literal, column),
                    ))
                }
            }
        };
        row.insert(column.clone(), value);
    }

    state.rows.lock().push(row);
    Response::Result(ResultBody::Void)
}

fn parse_literal(literal: &str, typ: &ColumnType) -> Option<CqlValue> {
    let literal = literal.trim();
    if let Some(text) = literal.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
        return Some(CqlValue::Text(text.to_string()));
    }
    match typ {
        ColumnType::Int => literal.parse().ok().map(CqlValue::Int),
        ColumnType::BigInt => literal.parse().ok().map(CqlValue::BigInt),
        ColumnType::Boolean => literal.parse().ok().map(CqlValue::Boolean),
        ColumnType::Double => literal.parse().ok().map(CqlValue::Double),
        _ => None,
    }
}

fn run_select(
    query: &str,
    params: &QueryParameters,
    table: &MockTable,
    state: &MockState,
) -> Response {
    // Column list between SELECT and FROM
    let upper = query.to_ascii_uppercase();
    let from = match upper.find("FROM") {
        Some(i) => i,
        None => {
            return Response::Error(ErrorBody::new(DbErrorCode::SYNTAX_ERROR, "missing FROM"))
        }
    };
    let column_list = query[6..from].trim();
    let selected: Vec<String> = if column_list == "*" {
        table.columns.iter().map(|(n, _)| n.clone()).collect()
    } else {
        column_list
            .split(',')
            .map(|c| c.trim().to_string())
            .collect()
    };

    let columns: Vec<ColumnSpec> = selected
        .iter()
        .map(|name| {
            let typ = table
                .column_type(name)
                .cloned()
                .unwrap_or(ColumnType::Blob);
            table.spec(name, typ)
        })
        .collect();

    let all_rows = state.rows.lock().clone();
    let cells: Vec<Vec<CqlValue>> = all_rows
        .iter()
        .map(|row| {
            selected
                .iter()
                .map(|name| row.get(name).cloned().unwrap_or(CqlValue::Null))
                .collect()
        })
        .collect();

    // Paging over the materialized rows: the continuation token is a plain
    // big-endian row offset
    let offset = params
        .paging_state
        .as_ref()
        .filter(|s| s.len() == 4)
        .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]) as usize)
        .unwrap_or(0);
    let page_size = params
        .page_size
        .filter(|p| *p > 0)
        .map(|p| p as usize)
        .unwrap_or(usize::MAX);

    let end = (offset + page_size).min(cells.len());
    let page: Vec<Vec<CqlValue>> = cells[offset.min(cells.len())..end].to_vec();
    let next = if end < cells.len() {
        Some((end as u32).to_be_bytes().to_vec())
    } else {
        None
    };

    rows_response(columns, page, next)
}

fn rows_response(
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<CqlValue>>,
    paging_state: Option<Vec<u8>>,
) -> Response {
    Response::Result(ResultBody::Rows(RowsPage {
        columns,
        paging_state,
        rows,
    }))
}

fn system_local(query_upper: &str, table: &MockTable) -> Response {
    if query_upper.contains("SCHEMA_VERSION") {
        let columns = vec![table.spec("schema_version", ColumnType::Uuid)];
        let version = uuid::Uuid::from_u128(0x42);
        return rows_response(columns, vec![vec![CqlValue::Uuid(version)]], None);
    }
    let columns = vec![
        table.spec("data_center", ColumnType::Text),
        table.spec("rack", ColumnType::Text),
        table.spec("tokens", ColumnType::Set(Box::new(ColumnType::Text))),
    ];
    let row = vec![
        CqlValue::Text("dc1".into()),
        CqlValue::Text("rack1".into()),
        CqlValue::Set(vec![CqlValue::Text("0".into())]),
    ];
    rows_response(columns, vec![row], None)
}

fn system_keyspaces(table: &MockTable) -> Response {
    let columns = vec![
        table.spec("keyspace_name", ColumnType::Text),
        table.spec(
            "replication",
            ColumnType::Map(Box::new(ColumnType::Text), Box::new(ColumnType::Text)),
        ),
    ];
    let row = vec![
        CqlValue::Text(table.keyspace.clone()),
        CqlValue::Map(vec![
            (
                CqlValue::Text("class".into()),
                CqlValue::Text("SimpleStrategy".into()),
            ),
            (
                CqlValue::Text("replication_factor".into()),
                CqlValue::Text("1".into()),
            ),
        ]),
    ];
    rows_response(columns, vec![row], None)
}

fn system_tables(table: &MockTable) -> Response {
    let columns = vec![
        table.spec("keyspace_name", ColumnType::Text),
        table.spec("table_name", ColumnType::Text),
    ];
    let row = vec![
        CqlValue::Text(table.keyspace.clone()),
        CqlValue::Text(table.name.clone()),
    ];
    rows_response(columns, vec![row], None)
}

fn system_columns(table: &MockTable) -> Response {
    let columns = vec![
        table.spec("keyspace_name", ColumnType::Text),
        table.spec("table_name", ColumnType::Text),
        table.spec("column_name", ColumnType::Text),
        table.spec("kind", ColumnType::Text),
        table.spec("position", ColumnType::Int),
    ];
    let mut rows = Vec::new();
    for (name, _) in &table.columns {
        let (kind, position) = if let Some(i) = table.partition_key.iter().position(|c| c == name)
        {
            ("partition_key", i as i32)
        } else if let Some(i) = table.clustering_key.iter().position(|c| c == name) {
            ("clustering", i as i32)
        } else {
            ("regular", -1)
        };
        rows.push(vec![
            CqlValue::Text(table.keyspace.clone()),
            CqlValue::Text(table.name.clone()),
            CqlValue::Text(name.clone()),
            CqlValue::Text(kind.into()),
            CqlValue::Int(position),
        ]);
    }
    rows_response(columns, rows, None)
}

fn traces_sessions(options: &MockOptions, table: &MockTable) -> Response {
    let columns = vec![
        table.spec("client", ColumnType::Inet),
        table.spec("command", ColumnType::Text),
        table.spec("coordinator", ColumnType::Inet),
        table.spec("duration", ColumnType::Int),
        table.spec(
            "parameters",
            ColumnType::Map(Box::new(ColumnType::Text), Box::new(ColumnType::Text)),
        ),
        table.spec("request", ColumnType::Text),
        table.spec("started_at", ColumnType::Timestamp),
    ];
    if !options.tracing_rows {
        return rows_response(columns, vec![], None);
    }
    let row = vec![
        CqlValue::Inet("127.0.0.1".parse().unwrap()),
        CqlValue::Text("QUERY".into()),
        CqlValue::Inet("127.0.0.1".parse().unwrap()),
        CqlValue::Int(1234),
        CqlValue::Map(vec![(
            CqlValue::Text("query".into()),
            CqlValue::Text("SELECT ...".into()),
        )]),
        CqlValue::Text("Execute CQL3 query".into()),
        CqlValue::Timestamp(1_700_000_000_000),
    ];
    rows_response(columns, vec![row], None)
}

fn traces_events(options: &MockOptions, table: &MockTable) -> Response {
    let columns = vec![
        table.spec("event_id", ColumnType::TimeUuid),
        table.spec("activity", ColumnType::Text),
        table.spec("source", ColumnType::Inet),
        table.spec("source_elapsed", ColumnType::Int),
        table.spec("thread", ColumnType::Text),
    ];
    if !options.tracing_rows {
        return rows_response(columns, vec![], None);
    }
    let row = vec![
        CqlValue::TimeUuid(uuid::Uuid::new_v4()),
        CqlValue::Text("Parsing statement".into()),
        CqlValue::Inet("127.0.0.1".parse().unwrap()),
        CqlValue::Int(55),
        CqlValue::Text("shard 0".into()),
    ];
    rows_response(columns, vec![row], None)
}
