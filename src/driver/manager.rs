//! Connection Manager
//!
//! 노드별 연결 풀과 토폴로지 인식을 관리합니다.
//!
//! 토폴로지 스냅샷과 토큰 링은 copy-on-write로 교체되므로 읽는 쪽은
//! 갱신과 동시에 실행돼도 블로킹되지 않습니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;

use crate::cql::message::{EventBody, QueryParameters, ResultBody};
use crate::cql::CqlValue;

use super::cluster::{Auth, NodeAddress, RetryConfig};
use super::conn::CqlClient;
use super::error::{DriverError, DriverResult};
use super::pool::{ConnectionPool, PoolConfig, PooledConnection};
use super::row::ResultSet;
use super::statement::Consistency;
use super::topology::{ClusterTopology, Keyspace, NodeInfo, NodeStatus, ReplicationStrategy, Table, TokenRing};

// ============================================================================
// NodeHealth - 노드 건강 상태
// ============================================================================

/// 노드 건강 상태
#[derive(Debug, Clone)]
struct NodeHealth {
    status: NodeStatus,
    consecutive_failures: u32,
    backoff_until: Option<Instant>,
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self {
            status: NodeStatus::Up,
            consecutive_failures: 0,
            backoff_until: None,
        }
    }
}

// ============================================================================
// ConnectionManager - 연결 관리자
// ============================================================================

/// 연결 관리자
///
/// 노드별 풀, 건강 추적, 토폴로지 갱신, 연결 선택을 담당합니다.
pub struct ConnectionManager {
    /// 초기 접촉 노드
    contact_points: Vec<NodeAddress>,
    /// 인증 정보
    auth: Option<Auth>,
    /// 풀 설정
    pool_config: PoolConfig,
    /// 재시도 정책
    retry: RetryConfig,
    /// 노드별 연결 풀
    pools: RwLock<HashMap<NodeAddress, Arc<ConnectionPool>>>,
    /// 노드별 건강 상태
    health: RwLock<HashMap<NodeAddress, NodeHealth>>,
    /// 토폴로지 스냅샷 (copy-on-write)
    topology: RwLock<Arc<ClusterTopology>>,
    /// 토큰 링 스냅샷 (copy-on-write)
    ring: RwLock<Arc<TokenRing>>,
    /// 현재 키스페이스 (풀과 공유)
    keyspace: Arc<RwLock<Option<String>>>,
    /// 라운드 로빈 인덱스
    round_robin: AtomicUsize,
    /// 열린 상태
    open: RwLock<bool>,
}

impl ConnectionManager {
    /// 새 연결 관리자 생성
    pub fn new(
        contact_points: Vec<NodeAddress>,
        auth: Option<Auth>,
        pool_config: PoolConfig,
        retry: RetryConfig,
    ) -> Self {
        let topology = ClusterTopology::from_contact_points(&contact_points);
        Self {
            contact_points,
            auth,
            pool_config,
            retry,
            pools: RwLock::new(HashMap::new()),
            health: RwLock::new(HashMap::new()),
            topology: RwLock::new(Arc::new(topology)),
            ring: RwLock::new(Arc::new(TokenRing::default())),
            keyspace: Arc::new(RwLock::new(None)),
            round_robin: AtomicUsize::new(0),
            open: RwLock::new(true),
        }
    }

    /// 초기 연결
    ///
    /// 접촉 노드를 순서대로 시도하여 하나라도 핸드셰이크에 성공하면
    /// 성공입니다. 전 노드 실패는 `Connect` 에러입니다.
    pub async fn init(&self) -> DriverResult<()> {
        let mut last_error: Option<DriverError> = None;
        let mut connected = false;

        for address in self.contact_points.clone() {
            let pool = self.get_or_create_pool(&address);
            match pool.acquire().await {
                Ok(mut conn) => {
                    conn.set_pool(pool.clone());
                    conn.return_to_pool();
                    self.report_success(&address);
                    connected = true;
                    break;
                }
                Err(e) => {
                    // 인증 실패는 해당 연결에 치명적이지만 다른 접촉 노드
                    // 시도는 막지 않는다 (재시도는 하지 않음)
                    tracing::debug!(node = %address, error = %e, "contact point unusable");
                    self.report_failure(&address);
                    last_error = Some(e);
                }
            }
        }

        if !connected {
            return Err(DriverError::connect(format!(
                "no contact point reachable: {}",
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no nodes configured".to_string())
            )));
        }

        if let Err(e) = self.refresh_topology().await {
            tracing::warn!(error = %e, "initial topology refresh failed");
        }
        Ok(())
    }

    /// 백그라운드 워커 시작 (주기 갱신 + 이벤트 리스너)
    pub fn spawn_workers(manager: &Arc<Self>, refresh_interval: Duration) {
        let poller = Arc::clone(manager);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(refresh_interval).await;
                if !poller.is_open() {
                    break;
                }
                if let Err(e) = poller.refresh_topology().await {
                    tracing::warn!(error = %e, "periodic topology refresh failed");
                }
            }
        });

        let listener = Arc::clone(manager);
        tokio::spawn(async move {
            let mut backoff = listener.retry.initial_backoff;
            while listener.is_open() {
                match listener.run_event_loop().await {
                    Ok(()) => backoff = listener.retry.initial_backoff,
                    Err(e) => {
                        if !listener.is_open() {
                            break;
                        }
                        tracing::debug!(error = %e, "event connection lost, reconnecting");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(listener.retry.max_backoff);
                    }
                }
            }
        });
    }

    /// 열린 상태 확인
    pub fn is_open(&self) -> bool {
        *self.open.read()
    }

    /// 재시도 정책
    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// 관리자 닫기
    pub async fn close(&self) {
        *self.open.write() = false;
        let pools: Vec<Arc<ConnectionPool>> = self.pools.read().values().cloned().collect();
        for pool in pools {
            pool.close().await;
        }
    }

    // ------------------------------------------------------------------
    // 연결 선택
    // ------------------------------------------------------------------

    /// 요청에 사용할 연결 획득
    ///
    /// 라우팅 키 토큰이 있고 링이 채워져 있으면 토큰 소유 노드를
    /// 우선하고, 아니면 건강한 노드 위를 라운드 로빈합니다. 후보가
    /// 모두 실패하면 `Connection` 에러입니다.
    pub async fn connection_for(
        &self,
        token: Option<i64>,
    ) -> DriverResult<(NodeAddress, PooledConnection)> {
        if !self.is_open() {
            return Err(DriverError::session("cluster handle is closed"));
        }

        let candidates = self.candidate_nodes(token);
        if candidates.is_empty() {
            return Err(DriverError::connection("no healthy node available"));
        }

        let mut last_error: Option<DriverError> = None;
        for address in candidates {
            let pool = self.get_or_create_pool(&address);
            match pool.acquire().await {
                Ok(mut conn) => {
                    conn.set_pool(pool.clone());
                    return Ok((address, conn));
                }
                Err(e) => {
                    if matches!(e, DriverError::Authentication(_)) {
                        return Err(e);
                    }
                    tracing::debug!(node = %address, error = %e, "connection attempt failed");
                    self.report_failure(&address);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DriverError::connection("all candidate nodes failed")))
    }

    /// 특정 노드의 연결 획득 (스키마 합의 검사 등)
    pub async fn connection_to(
        &self,
        address: &NodeAddress,
    ) -> DriverResult<PooledConnection> {
        let pool = self.get_or_create_pool(address);
        let mut conn = pool.acquire().await?;
        conn.set_pool(pool);
        Ok(conn)
    }

    /// 토큰 우선 + 라운드 로빈 후보 목록
    fn candidate_nodes(&self, token: Option<i64>) -> Vec<NodeAddress> {
        let healthy = self.healthy_nodes();
        if healthy.is_empty() {
            return healthy;
        }

        let mut ordered = Vec::with_capacity(healthy.len());

        // 토큰 소유 노드 우선
        if let Some(token) = token {
            let ring = self.ring.read().clone();
            if let Some(owner) = ring.node_for_token(token) {
                if healthy.contains(owner) {
                    ordered.push(owner.clone());
                }
            }
        }

        // 나머지는 라운드 로빈 순서로
        let start = self.round_robin.fetch_add(1, Ordering::Relaxed);
        for offset in 0..healthy.len() {
            let address = &healthy[(start + offset) % healthy.len()];
            if !ordered.contains(address) {
                ordered.push(address.clone());
            }
        }
        ordered
    }

    /// 건강한 노드 목록 (백오프가 끝난 Down 노드는 반개방으로 포함)
    fn healthy_nodes(&self) -> Vec<NodeAddress> {
        let topology = self.topology.read().clone();
        let health = self.health.read();
        let now = Instant::now();

        topology
            .nodes
            .iter()
            .map(|n| &n.address)
            .filter(|address| match health.get(address) {
                Some(h) if h.status == NodeStatus::Down => {
                    h.backoff_until.map_or(true, |until| now >= until)
                }
                _ => true,
            })
            .cloned()
            .collect()
    }

    /// 노드 풀 가져오기 또는 생성
    fn get_or_create_pool(&self, address: &NodeAddress) -> Arc<ConnectionPool> {
        // 읽기 락으로 먼저 확인
        {
            let pools = self.pools.read();
            if let Some(pool) = pools.get(address) {
                return pool.clone();
            }
        }

        // 쓰기 락으로 생성
        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(address) {
            return pool.clone();
        }

        let pool = Arc::new(ConnectionPool::new(
            address.clone(),
            self.pool_config.clone(),
            self.auth.clone(),
            Arc::clone(&self.keyspace),
        ));
        pools.insert(address.clone(), pool.clone());
        pool
    }

    // ------------------------------------------------------------------
    // 건강 추적
    // ------------------------------------------------------------------

    /// 노드 실패 보고
    ///
    /// 연속 실패가 정책 임계치에 도달하면 Down으로 표시하고 지수
    /// 백오프(지터 포함) 후에 재시도합니다.
    pub fn report_failure(&self, address: &NodeAddress) {
        let mut health = self.health.write();
        let entry = health.entry(address.clone()).or_default();
        entry.consecutive_failures += 1;

        if entry.consecutive_failures >= self.retry.down_after_failures {
            let exponent = (entry.consecutive_failures - self.retry.down_after_failures).min(10);
            let base = self
                .retry
                .initial_backoff
                .saturating_mul(1u32 << exponent)
                .min(self.retry.max_backoff);
            let jitter = rand::thread_rng().gen_range(0.8..1.2);
            let backoff = Duration::from_secs_f64(base.as_secs_f64() * jitter);

            if entry.status != NodeStatus::Down {
                tracing::warn!(node = %address, failures = entry.consecutive_failures, "marking node down");
            }
            entry.status = NodeStatus::Down;
            entry.backoff_until = Some(Instant::now() + backoff);
        }
    }

    /// 노드 성공 보고
    pub fn report_success(&self, address: &NodeAddress) {
        let mut health = self.health.write();
        let entry = health.entry(address.clone()).or_default();
        if entry.status == NodeStatus::Down {
            tracing::info!(node = %address, "node is back up");
        }
        *entry = NodeHealth::default();
    }

    /// 노드 상태 조회
    pub fn node_status(&self, address: &NodeAddress) -> NodeStatus {
        self.health
            .read()
            .get(address)
            .map(|h| h.status)
            .unwrap_or(NodeStatus::Up)
    }

    // ------------------------------------------------------------------
    // 토폴로지
    // ------------------------------------------------------------------

    /// 토폴로지 스냅샷
    pub fn topology_snapshot(&self) -> Arc<ClusterTopology> {
        self.topology.read().clone()
    }

    /// 토큰 링 스냅샷
    pub fn ring_snapshot(&self) -> Arc<TokenRing> {
        self.ring.read().clone()
    }

    /// 토폴로지 갱신
    ///
    /// 시스템 테이블을 읽어 새 스냅샷을 만들고 원자적으로 교체합니다.
    /// 멱등하며 요청과 동시에 실행될 수 있습니다. 스키마 섹션 실패는
    /// 이전 스키마를 유지한 채 경고만 남깁니다.
    pub async fn refresh_topology(&self) -> DriverResult<()> {
        let (address, mut conn) = self.connection_for(None).await?;

        let nodes = match self.fetch_nodes(&mut conn, &address).await {
            Ok(nodes) => nodes,
            Err(e) => {
                conn.discard();
                self.report_failure(&address);
                return Err(e);
            }
        };

        let keyspaces = match self.fetch_schema(&mut conn).await {
            Ok(keyspaces) => keyspaces,
            Err(e) => {
                tracing::warn!(error = %e, "schema refresh failed, keeping previous schema");
                self.topology.read().keyspaces.clone()
            }
        };
        conn.return_to_pool();
        self.report_success(&address);

        let topology = ClusterTopology { nodes, keyspaces };
        let ring = topology.build_ring();

        *self.topology.write() = Arc::new(topology);
        *self.ring.write() = Arc::new(ring);
        tracing::debug!("topology refreshed");
        Ok(())
    }

    /// system.local / system.peers에서 노드 목록 구성
    async fn fetch_nodes(
        &self,
        conn: &mut PooledConnection,
        local_address: &NodeAddress,
    ) -> DriverResult<Vec<NodeInfo>> {
        let mut nodes: Vec<NodeInfo> = Vec::new();

        let local = self
            .query_system(conn, "SELECT data_center, rack, tokens FROM system.local")
            .await?;
        let mut local_info = NodeInfo::new(local_address.clone());
        if let Some(row) = local.first() {
            local_info.datacenter = row.get("data_center").and_then(|v| v.as_str().map(String::from));
            local_info.rack = row.get("rack").and_then(|v| v.as_str().map(String::from));
            local_info.tokens = parse_tokens(row.get("tokens"));
        }
        nodes.push(local_info);

        let peers = self
            .query_system(conn, "SELECT peer, data_center, rack, tokens FROM system.peers")
            .await?;
        for row in peers.rows() {
            let Some(peer) = row.get("peer").and_then(CqlValue::as_inet) else {
                continue;
            };
            let address = NodeAddress::new(peer.to_string(), local_address.port);
            let mut info = NodeInfo::new(address);
            info.datacenter = row.get("data_center").and_then(|v| v.as_str().map(String::from));
            info.rack = row.get("rack").and_then(|v| v.as_str().map(String::from));
            info.tokens = parse_tokens(row.get("tokens"));
            nodes.push(info);
        }

        // 피어 테이블에 아직 없는 접촉 노드 유지
        for address in &self.contact_points {
            if !nodes.iter().any(|n| &n.address == address) {
                nodes.push(NodeInfo::new(address.clone()));
            }
        }

        // 현재 건강 상태 반영
        {
            let health = self.health.read();
            for node in &mut nodes {
                if let Some(h) = health.get(&node.address) {
                    node.status = h.status;
                }
            }
        }

        Ok(nodes)
    }

    /// system_schema에서 키스페이스/테이블/컬럼 메타데이터 구성
    async fn fetch_schema(
        &self,
        conn: &mut PooledConnection,
    ) -> DriverResult<HashMap<String, Keyspace>> {
        let mut keyspaces: HashMap<String, Keyspace> = HashMap::new();

        let rows = self
            .query_system(
                conn,
                "SELECT keyspace_name, replication FROM system_schema.keyspaces",
            )
            .await?;
        for row in rows.rows() {
            let Some(name) = row.get("keyspace_name").and_then(|v| v.as_str()) else {
                continue;
            };
            let replication = row
                .get("replication")
                .and_then(CqlValue::as_map)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|(k, v)| {
                            Some((k.as_str()?.to_string(), v.as_str()?.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            keyspaces.insert(
                name.to_string(),
                Keyspace::new(ReplicationStrategy::from_replication_map(replication)),
            );
        }

        let rows = self
            .query_system(
                conn,
                "SELECT keyspace_name, table_name FROM system_schema.tables",
            )
            .await?;
        for row in rows.rows() {
            let Some(keyspace) = row.get("keyspace_name").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(table) = row.get("table_name").and_then(|v| v.as_str()) else {
                continue;
            };
            if let Some(ks) = keyspaces.get_mut(keyspace) {
                ks.tables.insert(table.to_string(), Table::default());
            }
        }

        let rows = self
            .query_system(
                conn,
                "SELECT keyspace_name, table_name, column_name, kind, position \
                 FROM system_schema.columns",
            )
            .await?;
        // 파티션/클러스터링 키는 position 순서가 중요하다
        let mut keyed: Vec<(String, String, String, String, i32)> = Vec::new();
        for row in rows.rows() {
            let (Some(ks), Some(table), Some(column), Some(kind)) = (
                row.get("keyspace_name").and_then(|v| v.as_str()),
                row.get("table_name").and_then(|v| v.as_str()),
                row.get("column_name").and_then(|v| v.as_str()),
                row.get("kind").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            let position = row.get("position").and_then(CqlValue::as_int).unwrap_or(-1);
            keyed.push((
                ks.to_string(),
                table.to_string(),
                column.to_string(),
                kind.to_string(),
                position,
            ));
        }
        keyed.sort_by(|a, b| (&a.0, &a.1, a.4).cmp(&(&b.0, &b.1, b.4)));
        for (ks, table, column, kind, _) in keyed {
            let Some(table) = keyspaces.get_mut(&ks).and_then(|k| k.tables.get_mut(&table))
            else {
                continue;
            };
            table.columns.push(column.clone());
            match kind.as_str() {
                "partition_key" => table.partition_key.push(column),
                "clustering" => table.clustering_key.push(column),
                _ => {}
            }
        }

        Ok(keyspaces)
    }

    /// 시스템 테이블 쿼리 (일관성 ONE)
    async fn query_system(
        &self,
        conn: &mut PooledConnection,
        cql: &str,
    ) -> DriverResult<ResultSet> {
        let client = conn
            .client_mut()
            .ok_or_else(|| DriverError::connection("no protocol client on connection"))?;
        let params = QueryParameters {
            consistency: Consistency::One.code(),
            ..Default::default()
        };
        let outcome = client.query(cql, params, false).await?;
        match outcome.body {
            ResultBody::Rows(page) => Ok(ResultSet::from_page(page, None, outcome.warnings)),
            _ => Ok(ResultSet::empty(None, outcome.warnings)),
        }
    }

    // ------------------------------------------------------------------
    // 키스페이스
    // ------------------------------------------------------------------

    /// 모든 연결의 키스페이스 전환
    ///
    /// 실패한 전환도 현재 키스페이스를 바꿀 수 있습니다. 요청은 모든
    /// 연결에 영향을 주므로 동시에 서로 다른 이름으로 호출하지 마십시오.
    pub async fn use_keyspace(&self, name: &str, case_sensitive: bool) -> DriverResult<()> {
        validate_keyspace_name(name)?;
        let formatted = if case_sensitive {
            format!("\"{}\"", name)
        } else {
            name.to_string()
        };

        // 새 연결이 상속하도록 먼저 기록
        *self.keyspace.write() = Some(formatted.clone());

        let (address, mut conn) = self.connection_for(None).await?;
        let result = self
            .query_system(&mut conn, &format!("USE {}", formatted))
            .await;
        match result {
            Ok(_) => {
                conn.return_to_pool();
                self.report_success(&address);
            }
            Err(e) => {
                conn.discard();
                return Err(e);
            }
        }

        // 기존 유휴 연결은 폐기하여 재수립 시 키스페이스를 상속
        let pools: Vec<Arc<ConnectionPool>> = self.pools.read().values().cloned().collect();
        for pool in pools {
            pool.clear_idle();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 스키마 합의
    // ------------------------------------------------------------------

    /// 도달 가능한 모든 노드의 스키마 버전 조회
    pub async fn schema_versions(&self) -> DriverResult<Vec<uuid::Uuid>> {
        let nodes = self.healthy_nodes();
        if nodes.is_empty() {
            return Err(DriverError::connection("no healthy node available"));
        }

        let mut versions = Vec::new();
        for address in nodes {
            let mut conn = match self.connection_to(&address).await {
                Ok(conn) => conn,
                Err(_) => continue,
            };
            match self
                .query_system(&mut conn, "SELECT schema_version FROM system.local")
                .await
            {
                Ok(rows) => {
                    conn.return_to_pool();
                    if let Some(version) = rows
                        .first()
                        .and_then(|row| row.get("schema_version"))
                        .and_then(CqlValue::as_uuid)
                    {
                        versions.push(version);
                    }
                }
                Err(_) => conn.discard(),
            }
        }

        if versions.is_empty() {
            return Err(DriverError::connection(
                "no node answered the schema version query",
            ));
        }
        Ok(versions)
    }

    // ------------------------------------------------------------------
    // 이벤트 리스너
    // ------------------------------------------------------------------

    /// 이벤트 연결을 유지하며 푸시 알림 처리
    async fn run_event_loop(&self) -> DriverResult<()> {
        let nodes = self.healthy_nodes();
        let address = nodes
            .first()
            .ok_or_else(|| DriverError::connection("no healthy node for event connection"))?
            .clone();

        let mut client = CqlClient::connect(&address.to_socket_addr()).await?;
        client.startup(self.auth.as_ref()).await?;
        client
            .register(vec![
                crate::cql::message::EVENT_TOPOLOGY_CHANGE.to_string(),
                crate::cql::message::EVENT_STATUS_CHANGE.to_string(),
                crate::cql::message::EVENT_SCHEMA_CHANGE.to_string(),
            ])
            .await?;
        tracing::debug!(node = %address, "event connection registered");

        while self.is_open() {
            let event = client.recv_event().await?;
            self.handle_event(event).await;
        }
        client.close().await;
        Ok(())
    }

    /// 푸시 이벤트 처리
    async fn handle_event(&self, event: EventBody) {
        match event {
            EventBody::TopologyChange { change, address, port } => {
                tracing::info!(%change, %address, port, "topology change event");
                if let Err(e) = self.refresh_topology().await {
                    tracing::warn!(error = %e, "refresh after topology change failed");
                }
            }
            EventBody::SchemaChange(change) => {
                tracing::debug!(change_type = %change.change_type, keyspace = %change.keyspace, "schema change event");
                if let Err(e) = self.refresh_topology().await {
                    tracing::warn!(error = %e, "refresh after schema change failed");
                }
            }
            EventBody::StatusChange { status, address, port } => {
                let node = NodeAddress::new(address.to_string(), port.clamp(0, u16::MAX as i32) as u16);
                match status.as_str() {
                    "UP" => self.report_success(&node),
                    "DOWN" => {
                        let mut health = self.health.write();
                        let entry = health.entry(node.clone()).or_default();
                        entry.status = NodeStatus::Down;
                        entry.backoff_until =
                            Some(Instant::now() + self.retry.initial_backoff);
                        tracing::info!(node = %node, "node reported down");
                    }
                    other => tracing::debug!(status = other, "unknown status change"),
                }
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("contact_points", &self.contact_points)
            .field("pools", &self.pools.read().len())
            .field("open", &self.is_open())
            .finish()
    }
}

/// `system.local`/`system.peers`의 tokens 집합 파싱
fn parse_tokens(value: Option<&CqlValue>) -> Vec<i64> {
    let Some(CqlValue::Set(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| v.as_str().and_then(|s| s.parse().ok()))
        .collect()
}

/// 키스페이스 이름 검증 (최대 48자, 영숫자와 밑줄)
fn validate_keyspace_name(name: &str) -> DriverResult<()> {
    if name.is_empty() || name.len() > 48 {
        return Err(DriverError::session(format!(
            "invalid keyspace name '{}': must be 1-48 characters",
            name
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DriverError::session(format!(
            "invalid keyspace name '{}': only alphanumerics and underscores",
            name
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> NodeAddress {
        NodeAddress::new(format!("10.0.0.{}", n), 9042)
    }

    fn test_manager(nodes: Vec<NodeAddress>) -> ConnectionManager {
        ConnectionManager::new(nodes, None, PoolConfig::default(), RetryConfig::default())
    }

    #[test]
    fn test_health_tracking() {
        let manager = test_manager(vec![addr(1), addr(2)]);
        assert_eq!(manager.node_status(&addr(1)), NodeStatus::Up);

        // Below the threshold the node stays up
        manager.report_failure(&addr(1));
        manager.report_failure(&addr(1));
        assert_eq!(manager.node_status(&addr(1)), NodeStatus::Up);

        // Threshold reached
        manager.report_failure(&addr(1));
        assert_eq!(manager.node_status(&addr(1)), NodeStatus::Down);

        manager.report_success(&addr(1));
        assert_eq!(manager.node_status(&addr(1)), NodeStatus::Up);
    }

    #[test]
    fn test_down_node_excluded_from_candidates() {
        let manager = test_manager(vec![addr(1), addr(2)]);
        for _ in 0..manager.retry.down_after_failures {
            manager.report_failure(&addr(1));
        }

        let candidates = manager.candidate_nodes(None);
        assert_eq!(candidates, vec![addr(2)]);
    }

    #[test]
    fn test_round_robin_rotates() {
        let manager = test_manager(vec![addr(1), addr(2), addr(3)]);
        let first = manager.candidate_nodes(None)[0].clone();
        let second = manager.candidate_nodes(None)[0].clone();
        assert_ne!(first, second);
    }

    #[test]
    fn test_token_preference() {
        let manager = test_manager(vec![addr(1), addr(2)]);
        *manager.ring.write() = Arc::new(TokenRing::new(vec![
            (0, addr(1)),
            (i64::MAX / 2, addr(2)),
        ]));

        let candidates = manager.candidate_nodes(Some(-100));
        assert_eq!(candidates[0], addr(1));
        // Every healthy node stays in the fallback order
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_parse_tokens() {
        let value = CqlValue::Set(vec![
            CqlValue::Text("-9223372036854775808".into()),
            CqlValue::Text("42".into()),
            CqlValue::Text("bogus".into()),
        ]);
        assert_eq!(parse_tokens(Some(&value)), vec![i64::MIN, 42]);
        assert!(parse_tokens(None).is_empty());
    }

    #[test]
    fn test_validate_keyspace_name() {
        assert!(validate_keyspace_name("basic").is_ok());
        assert!(validate_keyspace_name("ks_1").is_ok());
        assert!(validate_keyspace_name("").is_err());
        assert!(validate_keyspace_name("bad-name").is_err());
        assert!(validate_keyspace_name(&"x".repeat(49)).is_err());
    }

    #[tokio::test]
    async fn test_init_fails_when_all_nodes_unreachable() {
        let manager = ConnectionManager::new(
            vec![
                NodeAddress::new("127.0.0.1", 1),
                NodeAddress::new("127.0.0.1", 2),
            ],
            None,
            PoolConfig {
                connection_timeout: Duration::from_millis(300),
                ..Default::default()
            },
            RetryConfig::default(),
        );
        let result = manager.init().await;
        assert!(matches!(result, Err(DriverError::Connect(_))));
    }
}
