//! Driver Module
//!
//! 클라이언트 SDK (클러스터 인식 CQL 드라이버)
//!
//! # 구성
//!
//! - 클러스터 설정/핸들 (Cluster, ClusterConfig, Auth, TlsOptions)
//! - 연결 관리 (ConnectionManager, ConnectionPool)
//! - 토폴로지 (ClusterTopology, TokenRing)
//! - 문장 (Query, PreparedStatement, BatchStatement, Consistency)
//! - 세션 실행 파이프라인 (Session, Pager, RowStream)
//! - 메트릭 (Metrics, MetricsSnapshot)
//! - 추적 (TracingInfo)
//!
//! # Example
//!
//! ```ignore
//! use basalt_driver::driver::{Cluster, ClusterConfig};
//!
//! let cluster = Cluster::new(ClusterConfig::new(vec!["10.0.0.1:9042".into()]))?;
//! let session = cluster.connect().await?;
//!
//! session.execute("CREATE KEYSPACE IF NOT EXISTS basic WITH REPLICATION = \
//!     { 'class': 'SimpleStrategy', 'replication_factor': 1 }", &[]).await?;
//! session.use_keyspace("basic", false).await?;
//!
//! let prepared = session.prepare("INSERT INTO basic (a, b, c) VALUES (?, ?, ?)").await?;
//! session.execute(prepared, &[1i32.into(), 2i32.into(), "abc".into()]).await?;
//!
//! let rows = session.execute("SELECT a, b, c FROM basic", &[]).await?;
//! for row in rows {
//!     println!("{}", row);
//! }
//! ```

pub mod cluster;
pub mod conn;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod partitioner;
pub mod pool;
pub mod row;
pub mod session;
pub mod statement;
pub mod topology;
pub mod trace;

// Re-exports
pub use cluster::{
    Auth, Cluster, ClusterConfig, ClusterConfigBuilder, ExecutionProfile, NodeAddress,
    RetryConfig, TlsOptions, VerifyMode, DEFAULT_PORT,
};
pub use conn::{CqlClient, CqlClientState, CqlConnection, CqlConnectionState, QueryOutcome};
pub use error::{DriverError, DriverResult};
pub use manager::ConnectionManager;
pub use metrics::{LatencyHistogram, Metrics, MetricsSnapshot};
pub use pool::{
    ConnectionPool, ConnectionState, PoolConfig, PoolConfigBuilder, PoolMetrics, PooledConnection,
};
pub use row::{Pager, ResultSet, Row, RowStream};
pub use session::Session;
pub use statement::{
    BatchEntry, BatchStatement, BatchType, Consistency, PreparedStatement, Query,
    SerialConsistency, Statement,
};
pub use topology::{
    ClusterTopology, Keyspace, NodeInfo, NodeStatus, ReplicationStrategy, Table, TokenRing,
};
pub use trace::{TracingEvent, TracingInfo};
