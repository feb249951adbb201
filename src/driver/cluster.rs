//! Cluster
//!
//! 클러스터 설정 및 연결 진입점

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::error::{DriverError, DriverResult};
use super::manager::ConnectionManager;
use super::pool::PoolConfig;
use super::session::Session;
use super::statement::{Consistency, SerialConsistency};

/// 기본 CQL 포트
pub const DEFAULT_PORT: u16 = 9042;

// ============================================================================
// NodeAddress - 노드 주소
// ============================================================================

/// 노드 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl NodeAddress {
    /// 새 노드 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// "host:port" 또는 "host" 형식 파싱
    pub fn parse(s: &str) -> DriverResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DriverError::configuration("empty node address"));
        }
        let parts: Vec<&str> = s.split(':').collect();
        match parts.len() {
            1 => Ok(Self::new(parts[0], DEFAULT_PORT)),
            2 => {
                let port = parts[1]
                    .parse()
                    .map_err(|_| DriverError::configuration(format!("invalid port in '{}'", s)))?;
                Ok(Self::new(parts[0], port))
            }
            _ => Err(DriverError::configuration(format!(
                "invalid node address '{}'",
                s
            ))),
        }
    }

    /// 소켓 주소 문자열
    pub fn to_socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Auth - 인증 정보
// ============================================================================

/// 인증 정보
#[derive(Debug, Clone)]
pub struct Auth {
    /// 사용자명
    pub username: String,
    /// 비밀번호
    pub password: String,
}

impl Auth {
    /// 새 인증 정보 생성
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// ============================================================================
// TlsOptions - TLS 설정
// ============================================================================

/// 인증서 검증 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// 검증 없음
    None,
    /// 피어 인증서 검증
    #[default]
    Peer,
}

/// TLS 설정
///
/// 연결별 전송 보안 컨텍스트입니다. 핸드셰이크 실패는 치명적이며
/// 재시도되지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// TLS 활성화 여부
    pub enabled: bool,
    /// CA 인증서 경로
    pub ca_path: Option<String>,
    /// 클라이언트 인증서 경로
    pub cert_path: Option<String>,
    /// 클라이언트 키 경로
    pub key_path: Option<String>,
    /// 검증 모드
    pub verify_mode: VerifyMode,
}

impl TlsOptions {
    /// 설정 검증
    pub fn validate(&self) -> DriverResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.verify_mode == VerifyMode::Peer && self.ca_path.is_none() {
            return Err(DriverError::configuration(
                "tls verify_mode Peer requires ca_path",
            ));
        }
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(DriverError::configuration(
                "tls cert_path and key_path must be set together",
            ));
        }
        for path in [&self.ca_path, &self.cert_path, &self.key_path]
            .into_iter()
            .flatten()
        {
            if !Path::new(path).exists() {
                return Err(DriverError::configuration(format!(
                    "tls file not found: {}",
                    path
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// RetryConfig - 재시도 정책
// ============================================================================

/// 일시적 연결 오류의 재시도 정책
///
/// 운영 튜닝 파라미터이므로 상수가 아닌 설정으로 노출합니다.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 대체 노드 재시도 최대 횟수
    pub max_retries: u32,
    /// 초기 백오프
    pub initial_backoff: Duration,
    /// 최대 백오프
    pub max_backoff: Duration,
    /// 노드를 Down으로 표시하기까지의 연속 실패 횟수
    pub down_after_failures: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            down_after_failures: 3,
        }
    }
}

// ============================================================================
// ExecutionProfile - 실행 프로파일
// ============================================================================

/// 실행 프로파일
#[derive(Debug, Clone)]
pub struct ExecutionProfile {
    /// 기본 일관성
    pub consistency: Consistency,
    /// 기본 직렬 일관성
    pub serial_consistency: Option<SerialConsistency>,
    /// 요청 타임아웃
    pub request_timeout: Duration,
    /// 페이지 크기
    pub page_size: i32,
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self {
            consistency: Consistency::LocalQuorum,
            serial_consistency: None,
            request_timeout: Duration::from_secs(30),
            page_size: 5000,
        }
    }
}

// ============================================================================
// ClusterConfig - 클러스터 설정
// ============================================================================

/// 클러스터 설정
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// 접촉 노드 목록 ("host:port")
    pub nodes: Vec<String>,
    /// 연결 시 사용할 키스페이스
    pub keyspace: Option<String>,
    /// 인증 정보
    pub auth: Option<Auth>,
    /// TLS 설정
    pub tls: Option<TlsOptions>,
    /// 기본 실행 프로파일
    pub default_execution_profile: ExecutionProfile,
    /// 노드별 연결 풀 설정
    pub pool: PoolConfig,
    /// 재시도 정책
    pub retry: RetryConfig,
    /// 토폴로지 주기 갱신 간격
    pub refresh_interval: Duration,
}

impl ClusterConfig {
    /// 노드 목록으로 설정 생성
    pub fn new(nodes: Vec<String>) -> Self {
        Self {
            nodes,
            keyspace: None,
            auth: None,
            tls: None,
            default_execution_profile: ExecutionProfile::default(),
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            refresh_interval: Duration::from_secs(60),
        }
    }

    /// 빌더 시작
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }
}

// ============================================================================
// ClusterConfigBuilder - 설정 빌더
// ============================================================================

/// 클러스터 설정 빌더
#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    nodes: Vec<String>,
    keyspace: Option<String>,
    auth: Option<Auth>,
    tls: Option<TlsOptions>,
    profile: ExecutionProfile,
    pool: PoolConfig,
    retry: RetryConfig,
    refresh_interval: Option<Duration>,
}

impl ClusterConfigBuilder {
    /// 접촉 노드 추가
    pub fn known_node(mut self, node: impl Into<String>) -> Self {
        self.nodes.push(node.into());
        self
    }

    /// 접촉 노드 목록 설정
    pub fn known_nodes(mut self, nodes: &[&str]) -> Self {
        self.nodes.extend(nodes.iter().map(|n| n.to_string()));
        self
    }

    /// 키스페이스 설정
    pub fn use_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// 인증 정보 설정
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// TLS 설정
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// 기본 일관성 설정
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.profile.consistency = consistency;
        self
    }

    /// 기본 직렬 일관성 설정
    pub fn with_serial_consistency(mut self, serial: SerialConsistency) -> Self {
        self.profile.serial_consistency = Some(serial);
        self
    }

    /// 요청 타임아웃 설정
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.profile.request_timeout = timeout;
        self
    }

    /// 페이지 크기 설정
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.profile.page_size = page_size;
        self
    }

    /// 풀 설정
    pub fn with_pool_config(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// 재시도 정책 설정
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 토폴로지 갱신 간격 설정
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// 설정 빌드
    pub fn build(self) -> ClusterConfig {
        let mut config = ClusterConfig::new(self.nodes);
        config.keyspace = self.keyspace;
        config.auth = self.auth;
        config.tls = self.tls;
        config.default_execution_profile = self.profile;
        config.pool = self.pool;
        config.retry = self.retry;
        if let Some(interval) = self.refresh_interval {
            config.refresh_interval = interval;
        }
        config
    }
}

// ============================================================================
// Cluster - 클러스터 핸들
// ============================================================================

/// 클러스터 핸들
///
/// 설정을 보관하고 세션을 생성합니다.
pub struct Cluster {
    config: ClusterConfig,
    addresses: Vec<NodeAddress>,
}

impl Cluster {
    /// 새 클러스터 핸들 생성
    pub fn new(config: ClusterConfig) -> DriverResult<Self> {
        if config.nodes.is_empty() {
            return Err(DriverError::configuration("at least one node is required"));
        }
        let addresses = config
            .nodes
            .iter()
            .map(|n| NodeAddress::parse(n))
            .collect::<DriverResult<Vec<_>>>()?;
        if let Some(tls) = &config.tls {
            tls.validate()?;
        }
        Ok(Self { config, addresses })
    }

    /// 클러스터 설정
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// 파싱된 접촉 노드 주소
    pub fn contact_points(&self) -> &[NodeAddress] {
        &self.addresses
    }

    /// 클러스터에 연결하고 세션 생성
    ///
    /// 접촉 노드를 순서대로 시도하여 하나라도 STARTUP 핸드셰이크에
    /// 성공하면 연결된 것으로 봅니다. 전부 실패하면 `Connect` 에러입니다.
    pub async fn connect(&self) -> DriverResult<Session> {
        let manager = Arc::new(ConnectionManager::new(
            self.addresses.clone(),
            self.config.auth.clone(),
            self.config.pool.clone(),
            self.config.retry.clone(),
        ));
        manager.init().await?;
        ConnectionManager::spawn_workers(&manager, self.config.refresh_interval);

        let session = Session::new(manager, self.config.default_execution_profile.clone());
        if let Some(keyspace) = &self.config.keyspace {
            session.use_keyspace(keyspace, false).await?;
        }
        Ok(session)
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("nodes", &self.addresses)
            .field("keyspace", &self.config.keyspace)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_address_parse() {
        let addr = NodeAddress::parse("10.0.0.1:9042").unwrap();
        assert_eq!(addr.host, "10.0.0.1");
        assert_eq!(addr.port, 9042);

        let addr = NodeAddress::parse("db.example.com").unwrap();
        assert_eq!(addr.port, DEFAULT_PORT);

        assert!(NodeAddress::parse("").is_err());
        assert!(NodeAddress::parse("a:b:c").is_err());
        assert!(NodeAddress::parse("host:notaport").is_err());
    }

    #[test]
    fn test_node_address_display() {
        let addr = NodeAddress::new("localhost", 9042);
        assert_eq!(addr.to_string(), "localhost:9042");
        assert_eq!(addr.to_socket_addr(), "localhost:9042");
    }

    #[test]
    fn test_cluster_config_builder() {
        let config = ClusterConfig::builder()
            .known_nodes(&["10.0.0.1:9042", "10.0.0.2:9042"])
            .use_keyspace("basic")
            .with_auth(Auth::new("basalt", "secret"))
            .with_consistency(Consistency::One)
            .with_request_timeout(Duration::from_secs(5))
            .with_page_size(100)
            .build();

        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.keyspace.as_deref(), Some("basic"));
        assert_eq!(config.default_execution_profile.consistency, Consistency::One);
        assert_eq!(
            config.default_execution_profile.request_timeout,
            Duration::from_secs(5)
        );
        assert_eq!(config.default_execution_profile.page_size, 100);
    }

    #[test]
    fn test_cluster_requires_nodes() {
        let result = Cluster::new(ClusterConfig::new(vec![]));
        assert!(matches!(result, Err(DriverError::Configuration(_))));
    }

    #[test]
    fn test_cluster_parses_contact_points() {
        let cluster = Cluster::new(ClusterConfig::new(vec![
            "10.0.0.1:9042".into(),
            "10.0.0.2".into(),
        ]))
        .unwrap();
        assert_eq!(cluster.contact_points().len(), 2);
        assert_eq!(cluster.contact_points()[1].port, DEFAULT_PORT);
    }

    #[test]
    fn test_tls_validation() {
        let tls = TlsOptions {
            enabled: true,
            ca_path: None,
            verify_mode: VerifyMode::Peer,
            ..Default::default()
        };
        assert!(tls.validate().is_err());

        let tls = TlsOptions {
            enabled: true,
            ca_path: Some("/nonexistent/ca.pem".into()),
            verify_mode: VerifyMode::Peer,
            ..Default::default()
        };
        assert!(tls.validate().is_err());

        let tls = TlsOptions {
            enabled: false,
            ..Default::default()
        };
        assert!(tls.validate().is_ok());

        // cert without key is rejected
        let tls = TlsOptions {
            enabled: true,
            ca_path: Some("/nonexistent/ca.pem".into()),
            cert_path: Some("/nonexistent/cert.pem".into()),
            key_path: None,
            verify_mode: VerifyMode::None,
            ..Default::default()
        };
        assert!(tls.validate().is_err());
    }

    #[test]
    fn test_retry_config_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.down_after_failures, 3);
        assert!(retry.initial_backoff < retry.max_backoff);
    }

    #[test]
    fn test_execution_profile_defaults() {
        let profile = ExecutionProfile::default();
        assert_eq!(profile.consistency, Consistency::LocalQuorum);
        assert!(profile.serial_consistency.is_none());
        assert_eq!(profile.page_size, 5000);
    }
}
