//! End-to-end driver tests against in-process mock nodes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use basalt_driver::{
    Auth, BatchStatement, Cluster, ClusterConfig, Consistency, CqlValue, DriverError, PoolConfig,
    Query, Session,
};

use common::{unreachable_address, MockNode, MockOptions, MockState, MockTable};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn config_for(nodes: Vec<String>) -> ClusterConfig {
    let mut config = ClusterConfig::new(nodes);
    config.pool = PoolConfig {
        connection_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    config.default_execution_profile.consistency = Consistency::One;
    config
}

async fn connect(node: &MockNode) -> Session {
    let cluster = Cluster::new(config_for(vec![node.address()])).expect("cluster config");
    cluster.connect().await.expect("connect to mock node")
}

#[tokio::test]
async fn insert_then_select_returns_the_row() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    session.use_keyspace("basic", false).await.unwrap();
    session
        .execute("INSERT INTO basic (a, b, c) VALUES (1, 2, 'abc')", &[])
        .await
        .unwrap();

    let result = session
        .execute("SELECT a, b, c FROM basic", &[])
        .await
        .unwrap();
    assert_eq!(result.len(), 1);

    let row = result.single().unwrap();
    assert_eq!(row.get_int("a").unwrap(), 1);
    assert_eq!(row.get_int("b").unwrap(), 2);
    assert_eq!(row.get_text("c").unwrap(), "abc");
}

#[tokio::test]
async fn prepared_insert_keeps_fixed_column() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    let prepared = session
        .prepare("INSERT INTO basic (a, b, c) VALUES (?, 7, ?)")
        .await
        .unwrap();

    for (a, c) in [(1, "x"), (2, "y"), (3, "z")] {
        session
            .execute(
                prepared.clone(),
                &[CqlValue::Int(a), CqlValue::Text(c.into())],
            )
            .await
            .unwrap();
    }

    let result = session
        .execute("SELECT a, b, c FROM basic", &[])
        .await
        .unwrap();
    assert_eq!(result.len(), 3);
    for row in result {
        assert_eq!(row.get_int("b").unwrap(), 7);
    }
}

#[tokio::test]
async fn prepare_is_idempotent_and_cached() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    let first = session
        .prepare("INSERT INTO basic (a, b, c) VALUES (?, ?, ?)")
        .await
        .unwrap();
    let prepares_after_first = node.state.prepare_count();

    let second = session
        .prepare("INSERT INTO basic (a, b, c) VALUES (?, ?, ?)")
        .await
        .unwrap();

    assert_eq!(first.id(), second.id());
    // No additional network round trip for the identical text
    assert_eq!(node.state.prepare_count(), prepares_after_first);
}

#[tokio::test]
async fn unprepared_response_triggers_transparent_reprepare() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    let prepared = session
        .prepare("INSERT INTO basic (a, b, c) VALUES (?, ?, ?)")
        .await
        .unwrap();
    let prepares_before = node.state.prepare_count();

    // The node forgets every statement id, as a different coordinator would
    node.state.forget_prepared();

    session
        .execute(
            prepared,
            &[
                CqlValue::Int(10),
                CqlValue::Int(20),
                CqlValue::Text("re".into()),
            ],
        )
        .await
        .unwrap();

    assert_eq!(node.state.prepare_count(), prepares_before + 1);
    assert_eq!(node.state.rows().len(), 1);
}

#[tokio::test]
async fn connect_succeeds_with_unreachable_subset() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let dead = unreachable_address().await;

    let cluster = Cluster::new(config_for(vec![dead, node.address()])).unwrap();
    let session = cluster.connect().await.expect("subset is reachable");

    session
        .execute("INSERT INTO basic (a, b, c) VALUES (5, 6, 'ok')", &[])
        .await
        .unwrap();
    assert_eq!(node.state.rows().len(), 1);
}

#[tokio::test]
async fn connect_fails_when_all_nodes_unreachable() {
    init_logging();
    let dead_a = unreachable_address().await;
    let dead_b = unreachable_address().await;

    let cluster = Cluster::new(config_for(vec![dead_a, dead_b])).unwrap();
    let result = cluster.connect().await;
    assert!(matches!(result, Err(DriverError::Connect(_))));
}

#[tokio::test]
async fn consistency_reaches_the_wire_as_configured() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    for consistency in [Consistency::Two, Consistency::Quorum, Consistency::All] {
        let query = Query::new("INSERT INTO basic (a, b, c) VALUES (1, 1, 'c')")
            .with_consistency(consistency);
        session.execute(query, &[]).await.unwrap();
        let recorded = node.state.recorded_consistencies();
        assert_eq!(recorded.last().copied(), Some(consistency.code()));
    }
}

#[tokio::test]
async fn weaker_consistency_is_satisfied_where_stronger_is_not() {
    init_logging();
    // Simulated cluster with a single alive replica out of three
    let state = Arc::new(MockState::default());
    let node = MockNode::start_with(
        MockTable::basic(),
        MockOptions {
            alive_replicas: Some(1),
            ..Default::default()
        },
        state,
    )
    .await;
    // A single attempt keeps the coordinator's verdict observable
    let mut config = config_for(vec![node.address()]);
    config.retry.max_retries = 0;
    let session = Cluster::new(config).unwrap().connect().await.unwrap();

    // One requires a single ack and succeeds
    let weak = Query::new("INSERT INTO basic (a, b, c) VALUES (1, 1, 'w')")
        .with_consistency(Consistency::One);
    session.execute(weak, &[]).await.unwrap();

    // Quorum needs two of three and must not be satisfied by one replica
    let strong = Query::new("INSERT INTO basic (a, b, c) VALUES (2, 2, 's')")
        .with_consistency(Consistency::Quorum);
    let err = session.execute(strong, &[]).await.unwrap_err();
    assert!(matches!(err, DriverError::Exec { code, .. } if code == 0x1000));
}

#[tokio::test]
async fn pager_visits_every_row_once_and_replays_after_rewind() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    for i in 0..10 {
        session
            .execute(
                &*format!("INSERT INTO basic (a, b, c) VALUES ({}, {}, 'r{}')", i, i, i),
                &[],
            )
            .await
            .unwrap();
    }

    let query = Query::new("SELECT a, b, c FROM basic").with_page_size(3);
    let mut pager = session.pages(query, vec![]);

    let mut pages = 0;
    let mut seen = Vec::new();
    while let Some(page) = pager.next_page().await.unwrap() {
        pages += 1;
        assert!(page.len() <= 3);
        for row in page {
            seen.push(row.get_int("a").unwrap());
        }
    }
    assert_eq!(pages, 4);
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
    assert!(pager.next_page().await.unwrap().is_none());

    // The sequence is restartable
    pager.rewind();
    let replay = pager.try_collect().await.unwrap();
    assert_eq!(replay.len(), 10);
}

#[tokio::test]
async fn row_stream_yields_all_rows() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    for i in 0..5 {
        session
            .execute(
                &*format!("INSERT INTO basic (a, b, c) VALUES ({}, 0, 's')", i),
                &[],
            )
            .await
            .unwrap();
    }

    let query = Query::new("SELECT a FROM basic").with_page_size(2);
    let rows = session.pages(query, vec![]).into_stream(8).try_collect().await.unwrap();
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn execute_all_accumulates_every_page() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    for i in 0..7 {
        session
            .execute(
                &*format!("INSERT INTO basic (a, b, c) VALUES ({}, 0, 'p')", i),
                &[],
            )
            .await
            .unwrap();
    }

    let query = Query::new("SELECT a FROM basic").with_page_size(2);
    let result = session.execute_all(query, &[]).await.unwrap();
    assert_eq!(result.len(), 7);
    assert!(result.paging_state().is_none());
}

#[tokio::test]
async fn batch_applies_simple_and_prepared_statements() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    let prepared = session
        .prepare("INSERT INTO basic (a, b, c) VALUES (?, ?, ?)")
        .await
        .unwrap();

    let mut batch = BatchStatement::new();
    batch.append_statement(Query::new("INSERT INTO basic (a, b, c) VALUES (?, ?, ?)"));
    batch.append_statement(prepared);

    session
        .batch(
            &batch,
            &[
                vec![CqlValue::Int(1), CqlValue::Int(2), CqlValue::Text("x".into())],
                vec![CqlValue::Int(3), CqlValue::Int(4), CqlValue::Text("y".into())],
            ],
        )
        .await
        .unwrap();

    assert_eq!(node.state.rows().len(), 2);
}

#[tokio::test]
async fn client_timeout_surfaces_without_killing_the_pool() {
    init_logging();
    let state = Arc::new(MockState::default());
    let node = MockNode::start_with(
        MockTable::basic(),
        MockOptions {
            response_delay: Some(Duration::from_millis(400)),
            ..Default::default()
        },
        state,
    )
    .await;
    let session = connect(&node).await;

    let mut query = Query::new("INSERT INTO basic (a, b, c) VALUES (1, 1, 't')");
    query.set_request_timeout(Duration::from_millis(50));
    let err = session.execute(query, &[]).await.unwrap_err();
    assert!(matches!(err, DriverError::Timeout(_)));

    // The node is not marked down by a client-side deadline: a patient
    // request on a fresh connection still completes
    let patient = Query::new("INSERT INTO basic (a, b, c) VALUES (2, 2, 'u')");
    session.execute(patient, &[]).await.unwrap();
}

#[tokio::test]
async fn tracing_returns_coordinator_and_events() {
    init_logging();
    let state = Arc::new(MockState::default());
    let node = MockNode::start_with(
        MockTable::basic(),
        MockOptions {
            tracing_rows: true,
            ..Default::default()
        },
        state,
    )
    .await;
    let session = connect(&node).await;

    let (result, trace) = session
        .execute_with_tracing("INSERT INTO basic (a, b, c) VALUES (1, 1, 'tr')", &[])
        .await
        .unwrap();

    assert!(result.tracing_id().is_some());
    assert_eq!(trace.coordinator, Some("127.0.0.1".parse().unwrap()));
    assert_eq!(trace.command.as_deref(), Some("QUERY"));
    assert!(!trace.events.is_empty());
}

#[tokio::test]
async fn metrics_count_queries_and_errors() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    session
        .execute("INSERT INTO basic (a, b, c) VALUES (1, 1, 'm')", &[])
        .await
        .unwrap();
    session.execute("SELECT a FROM basic", &[]).await.unwrap();
    let _ = session.execute("GIBBERISH STATEMENT", &[]).await;

    let metrics = session.metrics();
    assert_eq!(metrics.get_queries_num(), 2);
    assert_eq!(metrics.get_errors_num(), 1);
    assert!(metrics.get_latency_avg_ms().is_ok());
    assert!(metrics.get_latency_percentile_ms(99.0).is_ok());
}

#[tokio::test]
async fn cluster_metadata_exposes_schema() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    let topology = session.get_cluster_data().await.unwrap();
    let keyspace = topology.keyspaces.get("basic").expect("keyspace metadata");
    assert_eq!(keyspace.strategy.replication_factor(), 1);

    let table = keyspace.tables.get("basic").expect("table metadata");
    assert_eq!(table.partition_key, vec!["a"]);
    assert_eq!(table.clustering_key, vec!["b"]);
    assert_eq!(table.columns.len(), 3);
}

#[tokio::test]
async fn schema_agreement_on_single_node() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    assert!(session.check_schema_agreement().await.unwrap());
    let version = session.await_schema_agreement().await.unwrap();
    assert_eq!(version, uuid::Uuid::from_u128(0x42));
}

#[tokio::test]
async fn authentication_success_and_failure() {
    init_logging();
    let state = Arc::new(MockState::default());
    let node = MockNode::start_with(
        MockTable::basic(),
        MockOptions {
            auth: Some(("basalt".into(), "secret".into())),
            ..Default::default()
        },
        state,
    )
    .await;

    // Correct credentials
    let mut config = config_for(vec![node.address()]);
    config.auth = Some(Auth::new("basalt", "secret"));
    let session = Cluster::new(config).unwrap().connect().await.unwrap();
    session
        .execute("INSERT INTO basic (a, b, c) VALUES (1, 1, 'a')", &[])
        .await
        .unwrap();

    // Wrong credentials are fatal, never retried
    let mut config = config_for(vec![node.address()]);
    config.auth = Some(Auth::new("basalt", "wrong"));
    let result = Cluster::new(config).unwrap().connect().await;
    assert!(matches!(result, Err(DriverError::Connect(_))));
}

#[tokio::test]
async fn invalid_keyspace_name_rejected_locally() {
    init_logging();
    let node = MockNode::start(MockTable::basic()).await;
    let session = connect(&node).await;

    assert!(session.use_keyspace("bad-name", false).await.is_err());
    assert!(session.use_keyspace("", false).await.is_err());
}

#[tokio::test]
#[ignore] // 실제 클러스터 연결 필요
async fn smoke_against_local_cluster() {
    let cluster = Cluster::new(ClusterConfig::new(vec!["127.0.0.1:9042".into()])).unwrap();
    let session = cluster.connect().await.unwrap();
    let result = session
        .execute("SELECT keyspace_name FROM system_schema.keyspaces", &[])
        .await
        .unwrap();
    assert!(!result.is_empty());
}
