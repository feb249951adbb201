//! Session
//!
//! 실행 파이프라인: 인코딩 → 라우팅 → 전송 → 디코딩 → 메트릭 기록

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cql::message::{BatchQuery, QueryParameters, ResultBody};
use crate::cql::{serialize_value, CqlValue, DbErrorCode};

use super::cluster::ExecutionProfile;
use super::error::{DriverError, DriverResult};
use super::manager::ConnectionManager;
use super::metrics::{Metrics, MetricsSnapshot};
use super::partitioner::{murmur3_token, serialize_routing_key};
use super::row::{Pager, ResultSet};
use super::statement::{
    is_conditional_cql, BatchEntry, BatchStatement, PreparedStatement, Statement,
};
use super::topology::ClusterTopology;
use super::trace::{
    TracingEvent, TracingInfo, EVENTS_QUERY, SESSIONS_QUERY, TRACE_FETCH_ATTEMPTS,
    TRACE_FETCH_INTERVAL,
};

/// 스키마 합의 대기 시간 한도
const SCHEMA_AGREEMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// 스키마 합의 폴링 간격
const SCHEMA_AGREEMENT_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// Session - 세션
// ============================================================================

/// 데이터베이스 세션
///
/// 값싸게 복제되며 복제본은 연결 관리자, 준비된 문장 캐시, 메트릭을
/// 공유합니다. 동시 요청은 서로를 막지 않습니다.
#[derive(Clone)]
pub struct Session {
    /// 연결 관리자
    manager: Arc<ConnectionManager>,
    /// 메트릭 집계기
    metrics: Arc<Metrics>,
    /// 준비된 문장 캐시 (정확한 CQL 텍스트 기준)
    prepared_cache: Arc<Mutex<HashMap<String, PreparedStatement>>>,
    /// 기본 실행 프로파일
    profile: ExecutionProfile,
}

impl Session {
    /// 새 세션 생성
    pub(crate) fn new(manager: Arc<ConnectionManager>, profile: ExecutionProfile) -> Self {
        Self {
            manager,
            metrics: Arc::new(Metrics::new()),
            prepared_cache: Arc::new(Mutex::new(HashMap::new())),
            profile,
        }
    }

    /// 문장 실행 (단일 페이지)
    pub async fn execute(
        &self,
        statement: impl Into<Statement>,
        values: &[CqlValue],
    ) -> DriverResult<ResultSet> {
        self.run_statement(&statement.into(), values, None, false, false)
            .await
    }

    /// 추적과 함께 문장 실행
    ///
    /// 기본 요청이 끝난 뒤 추적 테이블을 보조 조회합니다. 추적 행이 아직
    /// 구체화되지 않았으면 부분/빈 정보를 돌려주고 기본 호출은 실패하지
    /// 않습니다.
    pub async fn execute_with_tracing(
        &self,
        statement: impl Into<Statement>,
        values: &[CqlValue],
    ) -> DriverResult<(ResultSet, TracingInfo)> {
        let result = self
            .run_statement(&statement.into(), values, None, true, false)
            .await?;

        let tracing_info = match result.tracing_id() {
            Some(id) => self.fetch_tracing_info(id).await,
            None => TracingInfo::default(),
        };
        Ok((result, tracing_info))
    }

    /// 모든 페이지를 모아 실행
    pub async fn execute_all(
        &self,
        statement: impl Into<Statement>,
        values: &[CqlValue],
    ) -> DriverResult<ResultSet> {
        let statement = statement.into();
        let mut merged: Option<ResultSet> = None;
        let mut paging_state: Option<Vec<u8>> = None;

        loop {
            let page = self
                .run_statement(&statement, values, paging_state.take(), false, true)
                .await?;
            paging_state = page.paging_state().map(|s| s.to_vec());

            merged = Some(match merged.take() {
                None => page,
                Some(acc) => acc.merged_with(page),
            });

            if paging_state.is_none() {
                let mut result = merged.unwrap_or_else(|| ResultSet::empty(None, Vec::new()));
                result.clear_paging_state();
                return Ok(result);
            }
        }
    }

    /// 준비 후 실행하는 편의 메서드
    ///
    /// 텍스트를 준비(캐시 적중 시 왕복 없음)한 뒤 바인딩과 함께
    /// 실행합니다.
    pub async fn execute_prepared(
        &self,
        query: impl Into<String>,
        values: &[CqlValue],
    ) -> DriverResult<ResultSet> {
        let prepared = self.prepare(query).await?;
        self.execute(prepared, values).await
    }

    /// 지연 페이지 시퀀스 생성
    pub fn pages(&self, statement: impl Into<Statement>, values: Vec<CqlValue>) -> Pager {
        Pager::new(self.clone(), statement.into(), values)
    }

    /// 문장 준비
    ///
    /// 동일한 텍스트로 다시 호출하면 네트워크 왕복 없이 캐시된 문장을
    /// 돌려줍니다.
    pub async fn prepare(&self, query: impl Into<String>) -> DriverResult<PreparedStatement> {
        let query = query.into();

        if let Some(cached) = self.prepared_cache.lock().get(&query).cloned() {
            return Ok(cached);
        }

        let (address, mut conn) = self.manager.connection_for(None).await?;
        let client = match conn.client_mut() {
            Some(client) => client,
            None => {
                conn.discard();
                return Err(DriverError::connection("no protocol client on connection"));
            }
        };

        match client.prepare(&query).await {
            Ok(body) => {
                conn.return_to_pool();
                self.manager.report_success(&address);
                let prepared =
                    PreparedStatement::new(body.id, query.clone(), body.pk_indices, body.bind_columns);
                self.prepared_cache
                    .lock()
                    .insert(query, prepared.clone());
                Ok(prepared)
            }
            Err(e) => {
                let err = match e {
                    crate::cql::CqlError::Server { code, message }
                        if DbErrorCode::is_statement_error(code) =>
                    {
                        conn.return_to_pool();
                        DriverError::prepare(code, message)
                    }
                    other => {
                        conn.discard();
                        self.manager.report_failure(&address);
                        other.into()
                    }
                };
                Err(err)
            }
        }
    }

    /// 배치 실행
    ///
    /// `values`는 배치 내 문장마다 하나씩, 같은 순서의 바인딩 목록입니다.
    pub async fn batch(
        &self,
        batch: &BatchStatement,
        values: &[Vec<CqlValue>],
    ) -> DriverResult<ResultSet> {
        let started = Instant::now();
        let result = self.batch_inner(batch, values).await;
        self.record_outcome(&result, started, false);
        result
    }

    /// 키스페이스 전환 (`USE <name>`)
    ///
    /// # Arguments
    ///
    /// * `keyspace_name` - 최대 48자의 영숫자/밑줄 키스페이스 이름
    /// * `case_sensitive` - true면 이름을 따옴표로 감쌉니다
    pub async fn use_keyspace(
        &self,
        keyspace_name: &str,
        case_sensitive: bool,
    ) -> DriverResult<()> {
        self.manager.use_keyspace(keyspace_name, case_sensitive).await
    }

    /// 클러스터 메타데이터 조회
    ///
    /// 메타데이터를 갱신한 뒤 읽기 전용 스냅샷을 돌려줍니다.
    pub async fn get_cluster_data(&self) -> DriverResult<ClusterTopology> {
        self.manager.refresh_topology().await?;
        Ok((*self.manager.topology_snapshot()).clone())
    }

    /// 메트릭 스냅샷
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 스키마 합의 여부 확인
    pub async fn check_schema_agreement(&self) -> DriverResult<bool> {
        let versions = self.manager.schema_versions().await?;
        Ok(versions.windows(2).all(|w| w[0] == w[1]))
    }

    /// 스키마 합의 대기
    ///
    /// 합의되면 스키마 버전을 돌려주고, 한도를 넘기면 타임아웃입니다.
    pub async fn await_schema_agreement(&self) -> DriverResult<uuid::Uuid> {
        let deadline = Instant::now() + SCHEMA_AGREEMENT_TIMEOUT;
        loop {
            let versions = self.manager.schema_versions().await?;
            if let Some(first) = versions.first() {
                if versions.iter().all(|v| v == first) {
                    return Ok(*first);
                }
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout("schema agreement not reached"));
            }
            tokio::time::sleep(SCHEMA_AGREEMENT_INTERVAL).await;
        }
    }

    /// 세션 닫기
    pub async fn close(&self) -> DriverResult<()> {
        self.manager.close().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // 파이프라인 내부
    // ------------------------------------------------------------------

    /// 페이저가 사용하는 단일 페이지 실행
    pub(crate) async fn execute_page(
        &self,
        statement: &Statement,
        values: &[CqlValue],
        paging_state: Option<Vec<u8>>,
    ) -> DriverResult<ResultSet> {
        self.run_statement(statement, values, paging_state, false, true)
            .await
    }

    /// 실행 파이프라인
    ///
    /// 인코딩은 네트워크 I/O 전에 끝나므로 타입 불일치는 로컬 에러로
    /// 끝납니다. UNPREPARED 응답은 같은 연결에서 재준비 후 한 번
    /// 재시도하고, 일시적 연결 오류는 정책 한도까지 대체 노드로
    /// 재시도합니다.
    async fn run_statement(
        &self,
        statement: &Statement,
        values: &[CqlValue],
        paging_state: Option<Vec<u8>>,
        tracing: bool,
        paged: bool,
    ) -> DriverResult<ResultSet> {
        let started = Instant::now();
        let result = self
            .run_statement_inner(statement, values, paging_state, tracing)
            .await;
        self.record_outcome(&result, started, paged);
        result
    }

    async fn run_statement_inner(
        &self,
        statement: &Statement,
        values: &[CqlValue],
        paging_state: Option<Vec<u8>>,
        tracing: bool,
    ) -> DriverResult<ResultSet> {
        let consistency = statement
            .consistency()
            .unwrap_or(self.profile.consistency);
        let serial_consistency = statement
            .serial_consistency()
            .or(self.profile.serial_consistency);
        let page_size = statement.page_size().unwrap_or(self.profile.page_size);
        let request_timeout = statement
            .request_timeout()
            .unwrap_or(self.profile.request_timeout);

        // 비조건부 문장에 직렬 일관성: 저렴한 검사이므로 로컬에서 빠르게 거부
        if serial_consistency.is_some() && !statement.is_conditional() {
            return Err(DriverError::exec(
                DbErrorCode::INVALID,
                "serial consistency set on a non-conditional statement",
            ));
        }

        // 문장에 실려 온 페이징 상태도 이어받는다
        let paging_state = paging_state.or_else(|| match statement {
            Statement::Simple(query) => query.paging_state().map(|s| s.to_vec()),
            Statement::Prepared(_) => None,
        });

        // 바인딩 인코딩 (I/O 전)
        let serialized = match statement {
            Statement::Simple(_) => serialize_unprepared(values)?,
            Statement::Prepared(prepared) => serialize_bound(prepared, values)?,
        };

        // 라우팅 키는 파티션 키 인덱스를 알 때만 유도 가능
        let token = match statement {
            Statement::Prepared(prepared) => routing_token(prepared, &serialized),
            Statement::Simple(_) => None,
        };

        let params = QueryParameters {
            consistency: consistency.code(),
            values: serialized,
            page_size: Some(page_size),
            paging_state,
            serial_consistency: serial_consistency.map(|s| s.code()),
        };

        let max_attempts = self.manager.retry_config().max_retries + 1;
        let mut last_error: Option<DriverError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.manager.retry_config().initial_backoff).await;
            }

            let (address, mut conn) = self.manager.connection_for(token).await?;
            let attempt_result = self
                .attempt_on_connection(&mut conn, statement, &params, tracing, request_timeout)
                .await;

            match attempt_result {
                AttemptOutcome::Success(result) => {
                    conn.return_to_pool();
                    self.manager.report_success(&address);
                    return Ok(result);
                }
                AttemptOutcome::Fatal(err) => {
                    conn.return_to_pool();
                    return Err(err);
                }
                AttemptOutcome::Broken(err) => {
                    conn.discard();
                    if matches!(err, DriverError::Timeout(_)) {
                        // 클라이언트 타임아웃은 노드 탓이 아니므로 건강에
                        // 반영하지 않고 즉시 보고한다
                        return Err(err);
                    }
                    self.manager.report_failure(&address);
                    if err.is_retryable() {
                        tracing::debug!(node = %address, error = %err, attempt, "retrying on alternate node");
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DriverError::connection("request failed on every candidate node")))
    }

    /// 한 연결에서의 시도 (UNPREPARED 재준비 포함)
    async fn attempt_on_connection(
        &self,
        conn: &mut super::pool::PooledConnection,
        statement: &Statement,
        params: &QueryParameters,
        tracing: bool,
        request_timeout: Duration,
    ) -> AttemptOutcome {
        let Some(client) = conn.client_mut() else {
            return AttemptOutcome::Broken(DriverError::connection(
                "no protocol client on connection",
            ));
        };

        let outcome = match statement {
            Statement::Simple(query) => {
                tokio::time::timeout(
                    request_timeout,
                    client.query(&query.contents, params.clone(), tracing),
                )
                .await
            }
            Statement::Prepared(prepared) => {
                tokio::time::timeout(
                    request_timeout,
                    client.execute(&prepared.id, params.clone(), tracing),
                )
                .await
            }
        };

        let outcome = match outcome {
            Err(_elapsed) => {
                // 응답은 여전히 도착할 수 있어 연결을 재사용할 수 없다
                return AttemptOutcome::Broken(DriverError::timeout(format!(
                    "request did not complete within {:?}",
                    request_timeout
                )));
            }
            Ok(outcome) => outcome,
        };

        match outcome {
            Ok(outcome) => AttemptOutcome::Success(result_set(outcome)),
            Err(crate::cql::CqlError::Server { code, message })
                if code == DbErrorCode::UNPREPARED =>
            {
                let Statement::Prepared(prepared) = statement else {
                    return AttemptOutcome::Fatal(DriverError::exec(code, message));
                };
                tracing::debug!(statement = %prepared.get_statement(), "re-preparing after UNPREPARED");
                self.reprepare_and_retry(conn, prepared, params, tracing, request_timeout)
                    .await
            }
            Err(e) => classify(e),
        }
    }

    /// UNPREPARED 후 같은 연결에서 재준비하고 한 번 재시도
    async fn reprepare_and_retry(
        &self,
        conn: &mut super::pool::PooledConnection,
        prepared: &PreparedStatement,
        params: &QueryParameters,
        tracing: bool,
        request_timeout: Duration,
    ) -> AttemptOutcome {
        let Some(client) = conn.client_mut() else {
            return AttemptOutcome::Broken(DriverError::connection(
                "no protocol client on connection",
            ));
        };

        let body = match client.prepare(prepared.get_statement()).await {
            Ok(body) => body,
            Err(e) => return classify(e),
        };

        let fresh = PreparedStatement::new(
            body.id.clone(),
            prepared.get_statement().to_string(),
            body.pk_indices,
            body.bind_columns,
        );
        self.prepared_cache
            .lock()
            .insert(fresh.get_statement().to_string(), fresh.clone());

        let retry = tokio::time::timeout(
            request_timeout,
            client.execute(&fresh.id, params.clone(), tracing),
        )
        .await;

        match retry {
            Err(_elapsed) => AttemptOutcome::Broken(DriverError::timeout(format!(
                "request did not complete within {:?}",
                request_timeout
            ))),
            Ok(Ok(outcome)) => AttemptOutcome::Success(result_set(outcome)),
            Ok(Err(e)) => classify(e),
        }
    }

    async fn batch_inner(
        &self,
        batch: &BatchStatement,
        values: &[Vec<CqlValue>],
    ) -> DriverResult<ResultSet> {
        if values.len() != batch.len() {
            return Err(DriverError::session(format!(
                "batch has {} statements but {} value lists were provided",
                batch.len(),
                values.len()
            )));
        }

        let consistency = batch.consistency().unwrap_or(self.profile.consistency);
        let serial_consistency = batch
            .serial_consistency()
            .or(self.profile.serial_consistency);

        if serial_consistency.is_some()
            && !batch
                .statements
                .iter()
                .any(|entry| match entry {
                    BatchEntry::Simple(query) => is_conditional_cql(&query.contents),
                    BatchEntry::Prepared(prepared) => is_conditional_cql(&prepared.statement),
                })
        {
            return Err(DriverError::exec(
                DbErrorCode::INVALID,
                "serial consistency set on a batch without conditional statements",
            ));
        }

        // 배치 인코딩과 라우팅 키 유도 (I/O 전)
        let mut statements = Vec::with_capacity(batch.len());
        let mut token = None;
        for (entry, bindings) in batch.statements.iter().zip(values) {
            match entry {
                BatchEntry::Simple(query) => statements.push(BatchQuery::Simple {
                    query: query.contents.clone(),
                    values: serialize_unprepared(bindings)?,
                }),
                BatchEntry::Prepared(prepared) => {
                    let serialized = serialize_bound(prepared, bindings)?;
                    if token.is_none() {
                        token = routing_token(prepared, &serialized);
                    }
                    statements.push(BatchQuery::Prepared {
                        id: prepared.id.clone(),
                        values: serialized,
                    });
                }
            }
        }

        let request_timeout = self.profile.request_timeout;
        let max_attempts = self.manager.retry_config().max_retries + 1;
        let mut last_error: Option<DriverError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.manager.retry_config().initial_backoff).await;
            }

            let (address, mut conn) = self.manager.connection_for(token).await?;
            let Some(client) = conn.client_mut() else {
                conn.discard();
                last_error = Some(DriverError::connection("no protocol client on connection"));
                continue;
            };

            let outcome = tokio::time::timeout(
                request_timeout,
                client.batch(
                    batch.batch_type().code(),
                    statements.clone(),
                    consistency.code(),
                    serial_consistency.map(|s| s.code()),
                    false,
                ),
            )
            .await;

            match outcome {
                Err(_elapsed) => {
                    conn.discard();
                    return Err(DriverError::timeout(format!(
                        "batch did not complete within {:?}",
                        request_timeout
                    )));
                }
                Ok(Ok(outcome)) => {
                    conn.return_to_pool();
                    self.manager.report_success(&address);
                    return Ok(result_set(outcome));
                }
                Ok(Err(e)) => match classify(e) {
                    AttemptOutcome::Fatal(err) => {
                        conn.return_to_pool();
                        return Err(err);
                    }
                    AttemptOutcome::Broken(err) => {
                        conn.discard();
                        self.manager.report_failure(&address);
                        if err.is_retryable() {
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }
                    AttemptOutcome::Success(result) => {
                        conn.return_to_pool();
                        return Ok(result);
                    }
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| DriverError::connection("batch failed on every candidate node")))
    }

    /// 추적 정보 보조 조회 (최선 노력)
    async fn fetch_tracing_info(&self, tracing_id: uuid::Uuid) -> TracingInfo {
        let id_value = [CqlValue::Uuid(tracing_id)];

        for attempt in 0..TRACE_FETCH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(TRACE_FETCH_INTERVAL).await;
            }

            let sessions = match self
                .run_statement(&Statement::from(SESSIONS_QUERY), &id_value, None, false, false)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::debug!(error = %e, "tracing session fetch failed");
                    continue;
                }
            };
            let Some(session_row) = sessions.first() else {
                continue;
            };
            let mut info = TracingInfo::from_session_row(session_row);

            if let Ok(events) = self
                .run_statement(&Statement::from(EVENTS_QUERY), &id_value, None, false, false)
                .await
            {
                info.events = events
                    .rows()
                    .iter()
                    .filter_map(TracingEvent::from_event_row)
                    .collect();
            }
            return info;
        }

        tracing::debug!(%tracing_id, "tracing rows not materialized in time");
        TracingInfo::default()
    }

    fn record_outcome<T>(&self, result: &DriverResult<T>, started: Instant, paged: bool) {
        self.metrics.record_latency(started.elapsed());
        match result {
            Ok(_) => self.metrics.record_query(paged),
            Err(_) => self.metrics.record_error(paged),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("prepared_cache", &self.prepared_cache.lock().len())
            .field("consistency", &self.profile.consistency)
            .finish()
    }
}

// ============================================================================
// 내부 헬퍼
// ============================================================================

/// 한 연결에서의 시도 결과
enum AttemptOutcome {
    /// 성공
    Success(ResultSet),
    /// 코디네이터가 응답했고 재시도 의미 없음 (연결은 정상)
    Fatal(DriverError),
    /// 연결을 폐기해야 하는 실패
    Broken(DriverError),
}

/// 프로토콜 에러를 시도 결과로 분류
fn classify(err: crate::cql::CqlError) -> AttemptOutcome {
    let transient = err.is_transient();
    let driver_err: DriverError = err.into();
    if transient {
        AttemptOutcome::Broken(driver_err)
    } else {
        AttemptOutcome::Fatal(driver_err)
    }
}

/// 성공 응답을 결과 집합으로 변환
fn result_set(outcome: super::conn::QueryOutcome) -> ResultSet {
    match outcome.body {
        ResultBody::Rows(page) => ResultSet::from_page(page, outcome.tracing_id, outcome.warnings),
        _ => ResultSet::empty(outcome.tracing_id, outcome.warnings),
    }
}

/// 단순 문장 바인딩: 값 태그에서 와이어 타입을 유추
fn serialize_unprepared(values: &[CqlValue]) -> DriverResult<Vec<Option<Vec<u8>>>> {
    values
        .iter()
        .map(|value| match value.inferred_type() {
            None => Ok(None),
            Some(typ) => serialize_value(value, &typ).map_err(DriverError::Encoding),
        })
        .collect()
}

/// 준비된 문장 바인딩: 서버가 준 바인드 타입으로 검사하며 인코딩
fn serialize_bound(
    prepared: &PreparedStatement,
    values: &[CqlValue],
) -> DriverResult<Vec<Option<Vec<u8>>>> {
    let bind_columns = prepared.bind_columns();
    if values.len() != bind_columns.len() {
        return Err(DriverError::session(format!(
            "statement expects {} bound values, got {}",
            bind_columns.len(),
            values.len()
        )));
    }
    values
        .iter()
        .zip(bind_columns)
        .map(|(value, column)| {
            serialize_value(value, &column.typ).map_err(DriverError::Encoding)
        })
        .collect()
}

/// 파티션 키 인덱스에서 라우팅 토큰 유도
fn routing_token(
    prepared: &PreparedStatement,
    serialized: &[Option<Vec<u8>>],
) -> Option<i64> {
    let pk_indices = prepared.pk_indices();
    if pk_indices.is_empty() {
        return None;
    }
    let mut components: Vec<&[u8]> = Vec::with_capacity(pk_indices.len());
    for index in pk_indices {
        match serialized.get(*index as usize) {
            Some(Some(bytes)) => components.push(bytes),
            _ => return None,
        }
    }
    serialize_routing_key(&components).map(|key| murmur3_token(&key))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::message::ColumnSpec;
    use crate::cql::ColumnType;
    use crate::driver::cluster::{NodeAddress, RetryConfig};
    use crate::driver::pool::PoolConfig;
    use crate::driver::statement::{Consistency, Query, SerialConsistency};

    fn offline_session() -> Session {
        // 아무도 듣지 않는 주소: I/O 이전 단계만 검증하는 용도
        let manager = Arc::new(ConnectionManager::new(
            vec![NodeAddress::new("127.0.0.1", 1)],
            None,
            PoolConfig {
                connection_timeout: Duration::from_millis(200),
                ..Default::default()
            },
            RetryConfig::default(),
        ));
        Session::new(manager, ExecutionProfile::default())
    }

    fn prepared_with_types(types: Vec<ColumnType>) -> PreparedStatement {
        let bind_columns = types
            .into_iter()
            .enumerate()
            .map(|(i, typ)| ColumnSpec {
                keyspace: "ks".into(),
                table: "t".into(),
                name: format!("c{}", i),
                typ,
            })
            .collect();
        PreparedStatement::new(vec![1], "INSERT INTO t (a, b) VALUES (?, ?)".into(), vec![0], bind_columns)
    }

    #[tokio::test]
    async fn test_serial_on_non_conditional_rejected_locally() {
        let session = offline_session();
        let mut query = Query::new("SELECT * FROM t");
        query.set_serial_consistency(SerialConsistency::Serial);

        // I/O 없이 즉시 거부되어야 한다
        let started = Instant::now();
        let err = session.execute(query, &[]).await.unwrap_err();
        assert!(matches!(err, DriverError::Exec { code, .. } if code == DbErrorCode::INVALID));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_bind_arity_checked_before_io() {
        let session = offline_session();
        let prepared = prepared_with_types(vec![ColumnType::Int, ColumnType::Text]);

        let err = session
            .execute(prepared, &[CqlValue::Int(1)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bound values"));
    }

    #[tokio::test]
    async fn test_bind_type_mismatch_is_encoding_error() {
        let session = offline_session();
        let prepared = prepared_with_types(vec![ColumnType::Int, ColumnType::Text]);

        let err = session
            .execute(
                prepared,
                &[CqlValue::Text("wrong".into()), CqlValue::Text("x".into())],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_local_failures_are_counted() {
        let session = offline_session();
        let prepared = prepared_with_types(vec![ColumnType::Int]);
        let _ = session.execute(prepared, &[]).await;

        let snapshot = session.metrics();
        assert_eq!(snapshot.get_errors_num(), 1);
        assert_eq!(snapshot.get_queries_num(), 0);
    }

    #[test]
    fn test_routing_token_derivation() {
        let prepared = prepared_with_types(vec![ColumnType::Int, ColumnType::Text]);
        let serialized = vec![Some(vec![0, 0, 0, 1]), Some(b"x".to_vec())];
        let token = routing_token(&prepared, &serialized);
        assert!(token.is_some());
        // 같은 파티션 키는 같은 토큰
        assert_eq!(token, routing_token(&prepared, &serialized));

        // 파티션 키 값이 null이면 토큰 없음
        let token = routing_token(&prepared, &[None, Some(b"x".to_vec())]);
        assert!(token.is_none());
    }

    #[test]
    fn test_routing_token_without_pk_indices() {
        let prepared = PreparedStatement::new(vec![1], "SELECT 1".into(), vec![], vec![]);
        assert_eq!(routing_token(&prepared, &[]), None);
    }

    #[test]
    fn test_serialize_unprepared_null() {
        let serialized = serialize_unprepared(&[CqlValue::Null, CqlValue::Int(1)]).unwrap();
        assert_eq!(serialized[0], None);
        assert_eq!(serialized[1], Some(vec![0, 0, 0, 1]));
    }

    #[tokio::test]
    async fn test_batch_values_arity() {
        let session = offline_session();
        let mut batch = BatchStatement::new();
        batch.append_statement(Query::new("INSERT INTO t (a) VALUES (?)"));

        let err = session.batch(&batch, &[]).await.unwrap_err();
        assert!(err.to_string().contains("value lists"));
    }

    #[tokio::test]
    async fn test_batch_serial_without_condition_rejected() {
        let session = offline_session();
        let mut batch = BatchStatement::new();
        batch.append_statement(Query::new("INSERT INTO t (a) VALUES (?)"));
        batch.set_serial_consistency(SerialConsistency::LocalSerial);

        let err = session.batch(&batch, &[vec![CqlValue::Int(1)]]).await.unwrap_err();
        assert!(matches!(err, DriverError::Exec { code, .. } if code == DbErrorCode::INVALID));
    }

    #[test]
    fn test_profile_resolution_prefers_statement() {
        let session = offline_session();
        assert_eq!(session.profile.consistency, Consistency::LocalQuorum);

        let mut query = Query::new("SELECT 1");
        query.set_consistency(Consistency::One);
        let statement: Statement = query.into();
        assert_eq!(statement.consistency(), Some(Consistency::One));
    }
}
