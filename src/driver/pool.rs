//! Connection Pool
//!
//! 노드별 연결 풀링

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;

use crate::cql::message::QueryParameters;

use super::cluster::{Auth, NodeAddress};
use super::conn::CqlClient;
use super::error::{DriverError, DriverResult};
use super::statement::Consistency;

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// 연결은 지연 생성됩니다. 미리 생성하는 워밍업은 없습니다.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 노드당 최대 연결 수
    pub max_size: usize,
    /// 연결 최대 수명
    pub max_lifetime: Duration,
    /// 유휴 타임아웃
    pub idle_timeout: Duration,
    /// 연결 수립 타임아웃
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            max_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(300),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: Option<PoolConfig>,
}

impl PoolConfigBuilder {
    fn config(&mut self) -> &mut PoolConfig {
        self.config.get_or_insert_with(PoolConfig::default)
    }

    /// 최대 연결 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config().max_size = size;
        self
    }

    /// 연결 최대 수명 설정
    pub fn max_lifetime(mut self, duration: Duration) -> Self {
        self.config().max_lifetime = duration;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn idle_timeout(mut self, duration: Duration) -> Self {
        self.config().idle_timeout = duration;
        self
    }

    /// 연결 수립 타임아웃 설정
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config().connection_timeout = duration;
        self
    }

    /// 설정 빌드
    pub fn build(mut self) -> PoolConfig {
        self.config.take().unwrap_or_default()
    }
}

// ============================================================================
// ConnectionState - 연결 상태
// ============================================================================

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 연결됨
    Connected,
    /// 유휴 상태
    Idle,
    /// 사용 중
    InUse,
    /// 닫힘
    Closed,
    /// 오류
    Failed,
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

/// 풀링된 연결
pub struct PooledConnection {
    /// 연결 ID
    id: u64,
    /// 노드 주소
    address: NodeAddress,
    /// 생성 시간
    created_at: Instant,
    /// 마지막 사용 시간
    last_used: Instant,
    /// 상태
    state: ConnectionState,
    /// 연결 풀 참조
    pool: Option<Arc<ConnectionPool>>,
    /// CQL 클라이언트 (실제 연결)
    pub(crate) client: Option<CqlClient>,
}

impl PooledConnection {
    /// 클라이언트와 함께 연결 생성
    pub(crate) fn with_client(id: u64, address: NodeAddress, client: CqlClient) -> Self {
        let now = Instant::now();
        Self {
            id,
            address,
            created_at: now,
            last_used: now,
            state: ConnectionState::Connected,
            pool: None,
            client: Some(client),
        }
    }

    /// 클라이언트 참조 (가변)
    pub fn client_mut(&mut self) -> Option<&mut CqlClient> {
        self.client.as_mut()
    }

    /// 연결 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 노드 주소
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// 연결 상태
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 유효성 확인
    pub fn is_valid(&self, config: &PoolConfig) -> bool {
        if self.state == ConnectionState::Closed || self.state == ConnectionState::Failed {
            return false;
        }

        if !self.client.as_ref().map_or(false, |c| c.is_ready()) {
            return false;
        }

        // 최대 수명 체크
        if self.created_at.elapsed() > config.max_lifetime {
            return false;
        }

        // 유휴 타임아웃 체크
        if self.state == ConnectionState::Idle && self.last_used.elapsed() > config.idle_timeout {
            return false;
        }

        true
    }

    /// 사용으로 표시
    pub fn mark_in_use(&mut self) {
        self.state = ConnectionState::InUse;
        self.last_used = Instant::now();
    }

    /// 유휴로 표시
    pub fn mark_idle(&mut self) {
        self.state = ConnectionState::Idle;
        self.last_used = Instant::now();
    }

    /// 닫힘으로 표시
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// 실패로 표시
    pub fn mark_failed(&mut self) {
        self.state = ConnectionState::Failed;
    }

    /// 연결 닫기
    pub async fn close(&mut self) {
        self.mark_closed();
        if let Some(ref mut client) = self.client {
            client.close().await;
        }
        self.client = None;
    }

    /// 풀 설정
    pub fn set_pool(&mut self, pool: Arc<ConnectionPool>) {
        self.pool = Some(pool);
    }

    /// 풀로 반환
    pub fn return_to_pool(mut self) {
        if let Some(pool) = self.pool.take() {
            self.mark_idle();
            pool.return_connection(self);
        }
    }

    /// 실패한 연결로 풀에 반환 (폐기됨)
    pub fn discard(mut self) {
        self.mark_failed();
        if let Some(pool) = self.pool.take() {
            pool.return_connection(self);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state)
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // 풀로 반환되지 않은 연결은 닫힌 것으로 처리
        if self.pool.is_some() && self.state != ConnectionState::Closed {
            self.mark_closed();
        }
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    /// 현재 크기
    pub size: usize,
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 노드별 연결 풀
pub struct ConnectionPool {
    /// 노드 주소
    address: NodeAddress,
    /// 풀 설정
    config: PoolConfig,
    /// 인증 정보
    auth: Option<Auth>,
    /// 현재 키스페이스 (새 연결이 상속)
    keyspace: Arc<RwLock<Option<String>>>,
    /// 유휴 연결들
    idle_connections: Mutex<VecDeque<PooledConnection>>,
    /// 세마포어 (동시 생성 제한)
    semaphore: Arc<Semaphore>,
    /// 현재 크기
    size: AtomicUsize,
    /// 사용 중인 연결 수
    in_use: AtomicUsize,
    /// 총 생성 횟수
    total_created: AtomicU64,
    /// 총 획득 횟수
    total_acquisitions: AtomicU64,
    /// 총 닫힌 횟수
    total_closed: AtomicU64,
    /// 다음 연결 ID
    next_id: AtomicU64,
    /// 열린 상태
    open: RwLock<bool>,
}

impl ConnectionPool {
    /// 새 연결 풀 생성
    pub fn new(
        address: NodeAddress,
        config: PoolConfig,
        auth: Option<Auth>,
        keyspace: Arc<RwLock<Option<String>>>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size));

        Self {
            address,
            config,
            auth,
            keyspace,
            idle_connections: Mutex::new(VecDeque::new()),
            semaphore,
            size: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            total_created: AtomicU64::new(0),
            total_acquisitions: AtomicU64::new(0),
            total_closed: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            open: RwLock::new(true),
        }
    }

    /// 연결 획득
    pub async fn acquire(&self) -> DriverResult<PooledConnection> {
        if !*self.open.read() {
            return Err(DriverError::pool("Pool is closed"));
        }

        // 먼저 유휴 연결 확인
        if let Some(conn) = self.get_idle_connection() {
            self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
            self.in_use.fetch_add(1, Ordering::Relaxed);
            return Ok(conn);
        }

        // 세마포어 획득 (타임아웃)
        let permit = tokio::time::timeout(
            self.config.connection_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| DriverError::timeout("Connection acquisition timeout"))?
        .map_err(|_| DriverError::pool("Pool semaphore closed"))?;

        // 다시 유휴 연결 확인
        if let Some(conn) = self.get_idle_connection() {
            drop(permit);
            self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
            self.in_use.fetch_add(1, Ordering::Relaxed);
            return Ok(conn);
        }

        // 새 연결 생성
        let conn = self.create_connection().await?;
        drop(permit);

        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);

        Ok(conn)
    }

    /// 유휴 연결 가져오기
    fn get_idle_connection(&self) -> Option<PooledConnection> {
        let mut idle = self.idle_connections.lock();

        while let Some(mut conn) = idle.pop_front() {
            if conn.is_valid(&self.config) {
                conn.mark_in_use();
                return Some(conn);
            } else {
                // 유효하지 않은 연결 폐기
                conn.mark_closed();
                self.size.fetch_sub(1, Ordering::Relaxed);
                self.total_closed.fetch_add(1, Ordering::Relaxed);
            }
        }

        None
    }

    /// 새 연결 생성 (STARTUP + 인증 + 키스페이스 상속)
    async fn create_connection(&self) -> DriverResult<PooledConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let address_str = self.address.to_socket_addr();
        let keyspace = self.keyspace.read().clone();

        let client = tokio::time::timeout(self.config.connection_timeout, async {
            let mut client = CqlClient::connect(&address_str).await?;
            client.startup(self.auth.as_ref()).await?;
            if let Some(keyspace) = &keyspace {
                let params = QueryParameters {
                    consistency: Consistency::One.code(),
                    ..Default::default()
                };
                client
                    .query(&format!("USE {}", keyspace), params, false)
                    .await?;
            }
            Ok::<_, crate::cql::CqlError>(client)
        })
        .await
        .map_err(|_| {
            DriverError::timeout(format!("connection to {} timed out", address_str))
        })??;

        let mut conn = PooledConnection::with_client(id, self.address.clone(), client);
        conn.mark_in_use();
        self.size.fetch_add(1, Ordering::Relaxed);
        self.total_created.fetch_add(1, Ordering::Relaxed);

        Ok(conn)
    }

    /// 연결 반환
    pub fn return_connection(&self, mut conn: PooledConnection) {
        if !*self.open.read() {
            conn.mark_closed();
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.total_closed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.in_use.fetch_sub(1, Ordering::Relaxed);

        if conn.is_valid(&self.config) {
            conn.mark_idle();
            let mut idle = self.idle_connections.lock();
            idle.push_back(conn);
        } else {
            conn.mark_closed();
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 유휴 연결 비우기 (키스페이스 변경 후 재수립 유도)
    pub fn clear_idle(&self) {
        let mut idle = self.idle_connections.lock();
        let drained = idle.len();
        idle.clear();
        if drained > 0 {
            self.size.fetch_sub(drained, Ordering::Relaxed);
            self.total_closed.fetch_add(drained as u64, Ordering::Relaxed);
            tracing::debug!(node = %self.address, drained, "cleared idle connections");
        }
    }

    /// 풀 닫기
    pub async fn close(&self) {
        *self.open.write() = false;

        let connections: Vec<PooledConnection> = {
            let mut idle = self.idle_connections.lock();
            idle.drain(..).collect()
        };
        for mut conn in connections {
            conn.close().await;
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        let idle = self.idle_connections.lock().len();

        PoolMetrics {
            size: self.size.load(Ordering::Relaxed),
            idle,
            in_use: self.in_use.load(Ordering::Relaxed),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
        }
    }

    /// 노드 주소
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// 풀 크기
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// 유휴 연결 수
    pub fn idle_count(&self) -> usize {
        self.idle_connections.lock().len()
    }

    /// 사용 중인 연결 수
    pub fn in_use_count(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.address)
            .field("size", &self.size())
            .field("idle", &self.idle_count())
            .field("in_use", &self.in_use_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
