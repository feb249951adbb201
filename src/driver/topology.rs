//! Cluster Topology
//!
//! 클러스터의 노드와 스키마 메타데이터 스냅샷을 관리합니다.

use std::collections::HashMap;

use super::cluster::NodeAddress;

// ============================================================================
// NodeStatus - 노드 상태
// ============================================================================

/// 노드 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// 정상
    Up,
    /// 연속 실패로 차단됨
    Down,
}

// ============================================================================
// NodeInfo - 노드 정보
// ============================================================================

/// 노드 정보
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// 노드 주소
    pub address: NodeAddress,
    /// 데이터센터
    pub datacenter: Option<String>,
    /// 랙
    pub rack: Option<String>,
    /// 소유 토큰
    pub tokens: Vec<i64>,
    /// 상태
    pub status: NodeStatus,
}

impl NodeInfo {
    /// 새 노드 정보 생성
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            datacenter: None,
            rack: None,
            tokens: Vec::new(),
            status: NodeStatus::Up,
        }
    }
}

// ============================================================================
// ReplicationStrategy - 복제 전략
// ============================================================================

/// 복제 전략
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationStrategy {
    /// 단순 전략
    Simple { replication_factor: u32 },
    /// 데이터센터별 전략
    NetworkTopology {
        datacenter_repfactors: HashMap<String, i32>,
    },
    /// 로컬 전략 (시스템 키스페이스)
    Local,
    /// 기타 전략
    Other {
        name: String,
        data: HashMap<String, String>,
    },
}

impl ReplicationStrategy {
    /// `system_schema.keyspaces`의 replication 맵에서 파싱
    pub fn from_replication_map(mut replication: HashMap<String, String>) -> Self {
        let class = replication.remove("class").unwrap_or_default();
        let short_name = class.rsplit('.').next().unwrap_or(&class).to_string();

        match short_name.as_str() {
            "SimpleStrategy" => {
                let replication_factor = replication
                    .get("replication_factor")
                    .and_then(|rf| rf.parse().ok())
                    .unwrap_or(1);
                Self::Simple { replication_factor }
            }
            "NetworkTopologyStrategy" => {
                let datacenter_repfactors = replication
                    .into_iter()
                    .filter_map(|(dc, rf)| rf.parse().ok().map(|rf| (dc, rf)))
                    .collect();
                Self::NetworkTopology {
                    datacenter_repfactors,
                }
            }
            "LocalStrategy" => Self::Local,
            _ => Self::Other {
                name: short_name,
                data: replication,
            },
        }
    }

    /// 전략 이름
    pub fn kind(&self) -> &str {
        match self {
            Self::Simple { .. } => "SimpleStrategy",
            Self::NetworkTopology { .. } => "NetworkTopologyStrategy",
            Self::Local => "LocalStrategy",
            Self::Other { name, .. } => name,
        }
    }

    /// 단일 DC 기준 복제 계수
    pub fn replication_factor(&self) -> u32 {
        match self {
            Self::Simple { replication_factor } => *replication_factor,
            Self::NetworkTopology {
                datacenter_repfactors,
            } => datacenter_repfactors
                .values()
                .map(|rf| (*rf).max(0) as u32)
                .sum(),
            Self::Local => 1,
            Self::Other { .. } => 1,
        }
    }
}

// ============================================================================
// Table / Keyspace - 스키마 메타데이터
// ============================================================================

/// 테이블 메타데이터
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// 컬럼 이름 목록
    pub columns: Vec<String>,
    /// 파티션 키 컬럼 (순서대로)
    pub partition_key: Vec<String>,
    /// 클러스터링 키 컬럼 (순서대로)
    pub clustering_key: Vec<String>,
}

/// 키스페이스 메타데이터
#[derive(Debug, Clone)]
pub struct Keyspace {
    /// 복제 전략
    pub strategy: ReplicationStrategy,
    /// 테이블 메타데이터
    pub tables: HashMap<String, Table>,
}

impl Keyspace {
    /// 새 키스페이스 생성
    pub fn new(strategy: ReplicationStrategy) -> Self {
        Self {
            strategy,
            tables: HashMap::new(),
        }
    }
}

// ============================================================================
// ClusterTopology - 토폴로지 스냅샷
// ============================================================================

/// 클러스터 토폴로지 스냅샷
///
/// 연결 관리자가 소유하며 copy-on-write로 갱신됩니다. 읽는 쪽은 Arc
/// 스냅샷을 복제하므로 갱신 중에도 블로킹되지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    /// 알려진 노드
    pub nodes: Vec<NodeInfo>,
    /// 키스페이스 메타데이터
    pub keyspaces: HashMap<String, Keyspace>,
}

impl ClusterTopology {
    /// 접촉 노드만으로 초기 토폴로지 생성
    pub fn from_contact_points(addresses: &[NodeAddress]) -> Self {
        Self {
            nodes: addresses.iter().cloned().map(NodeInfo::new).collect(),
            keyspaces: HashMap::new(),
        }
    }

    /// 키스페이스 정보 조회
    pub fn get_keyspace_info(&self) -> &HashMap<String, Keyspace> {
        &self.keyspaces
    }

    /// 특정 테이블 조회
    pub fn table(&self, keyspace: &str, table: &str) -> Option<&Table> {
        self.keyspaces.get(keyspace)?.tables.get(table)
    }

    /// 노드 조회
    pub fn node(&self, address: &NodeAddress) -> Option<&NodeInfo> {
        self.nodes.iter().find(|n| &n.address == address)
    }

    /// 토큰 링 구축
    pub fn build_ring(&self) -> TokenRing {
        let mut entries = Vec::new();
        for node in &self.nodes {
            for token in &node.tokens {
                entries.push((*token, node.address.clone()));
            }
        }
        TokenRing::new(entries)
    }
}

// ============================================================================
// TokenRing - 토큰 링
// ============================================================================

/// 토큰 링
///
/// 토큰을 소유 노드로 사상합니다. 항목이 없으면 라우팅은 라운드 로빈으로
/// 폴백합니다.
#[derive(Debug, Clone, Default)]
pub struct TokenRing {
    entries: Vec<(i64, NodeAddress)>,
}

impl TokenRing {
    /// 토큰-노드 쌍으로 링 생성
    pub fn new(mut entries: Vec<(i64, NodeAddress)>) -> Self {
        entries.sort_by_key(|(token, _)| *token);
        entries.dedup_by(|a, b| a.0 == b.0);
        Self { entries }
    }

    /// 링이 비어 있는지 확인
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 링 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 토큰의 소유 노드 조회 (시계 방향 후속 노드, 랩어라운드 포함)
    pub fn node_for_token(&self, token: i64) -> Option<&NodeAddress> {
        if self.entries.is_empty() {
            return None;
        }
        let index = match self.entries.binary_search_by_key(&token, |(t, _)| *t) {
            Ok(i) => i,
            Err(i) => {
                if i == self.entries.len() {
                    0
                } else {
                    i
                }
            }
        };
        self.entries.get(index).map(|(_, address)| address)
    }
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

    #[test]
    fn test_strategy_from_replication_map() {
        let mut map = HashMap::new();
        map.insert("class".to_string(), "SimpleStrategy".to_string());
        map.insert("replication_factor".to_string(), "3".to_string());
        let strategy = ReplicationStrategy::from_replication_map(map);
        assert_eq!(
            strategy,
            ReplicationStrategy::Simple {
                replication_factor: 3
            }
        );
        assert_eq!(strategy.replication_factor(), 3);
    }

    #[test]
    fn test_strategy_fully_qualified_class() {
        let mut map = HashMap::new();
        map.insert(
            "class".to_string(),
            "org.apache.cassandra.locator.NetworkTopologyStrategy".to_string(),
        );
        map.insert("dc1".to_string(), "3".to_string());
        map.insert("dc2".to_string(), "2".to_string());
        let strategy = ReplicationStrategy::from_replication_map(map);
        match &strategy {
            ReplicationStrategy::NetworkTopology {
                datacenter_repfactors,
            } => {
                assert_eq!(datacenter_repfactors.get("dc1"), Some(&3));
                assert_eq!(datacenter_repfactors.get("dc2"), Some(&2));
            }
            other => panic!("unexpected strategy: {:?}", other),
        }
        assert_eq!(strategy.replication_factor(), 5);
    }

    #[test]
    fn test_strategy_local_and_other() {
        let mut map = HashMap::new();
        map.insert("class".to_string(), "LocalStrategy".to_string());
        assert_eq!(
            ReplicationStrategy::from_replication_map(map),
            ReplicationStrategy::Local
        );

        let mut map = HashMap::new();
        map.insert("class".to_string(), "EverywhereStrategy".to_string());
        let strategy = ReplicationStrategy::from_replication_map(map);
        assert_eq!(strategy.kind(), "EverywhereStrategy");
    }

    #[test]
    fn test_topology_from_contact_points() {
        let topology = ClusterTopology::from_contact_points(&[addr(1), addr(2)]);
        assert_eq!(topology.nodes.len(), 2);
        assert!(topology.keyspaces.is_empty());
        assert_eq!(topology.node(&addr(1)).map(|n| n.status), Some(NodeStatus::Up));
    }

    #[test]
    fn test_table_lookup() {
        let mut topology = ClusterTopology::default();
        let mut keyspace = Keyspace::new(ReplicationStrategy::Simple {
            replication_factor: 1,
        });
        keyspace.tables.insert(
            "basic".to_string(),
            Table {
                columns: vec!["a".into(), "b".into(), "c".into()],
                partition_key: vec!["a".into()],
                clustering_key: vec!["b".into()],
            },
        );
        topology.keyspaces.insert("basic".to_string(), keyspace);

        let table = topology.table("basic", "basic").unwrap();
        assert_eq!(table.partition_key, vec!["a"]);
        assert!(topology.table("basic", "missing").is_none());
        assert!(topology.table("missing", "basic").is_none());
    }

    #[test]
    fn test_token_ring_lookup() {
        let ring = TokenRing::new(vec![(100, addr(1)), (-50, addr(2)), (0, addr(3))]);
        assert_eq!(ring.len(), 3);

        // Exact hit
        assert_eq!(ring.node_for_token(0), Some(&addr(3)));
        // Successor
        assert_eq!(ring.node_for_token(-10), Some(&addr(3)));
        assert_eq!(ring.node_for_token(1), Some(&addr(1)));
        // Wraparound past the highest token
        assert_eq!(ring.node_for_token(101), Some(&addr(2)));
        // Before the lowest token
        assert_eq!(ring.node_for_token(i64::MIN), Some(&addr(2)));
    }

    #[test]
    fn test_token_ring_empty() {
        let ring = TokenRing::default();
        assert!(ring.is_empty());
        assert_eq!(ring.node_for_token(42), None);
    }

    #[test]
    fn test_build_ring_from_topology() {
        let mut topology = ClusterTopology::from_contact_points(&[addr(1), addr(2)]);
        topology.nodes[0].tokens = vec![0, 200];
        topology.nodes[1].tokens = vec![100];
        let ring = topology.build_ring();
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.node_for_token(50), Some(&addr(2)));
        assert_eq!(ring.node_for_token(150), Some(&addr(1)));
    }
}
