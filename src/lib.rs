//! # Basalt Driver
//!
//! A Rust driver for the Basalt distributed wide-column store with full
//! CQL native protocol support.
//!
//! ## Features
//!
//! - **CQL Native Protocol v4** - Full binary protocol implementation
//! - **Async/Await** - Built on Tokio for high-performance async operations
//! - **Cluster Awareness** - Topology refresh, server push events, per-node
//!   connection pools with health tracking and backoff
//! - **Token-Aware Routing** - Requests route to the partition's owner node
//!   when a routing key can be derived, falling back to round-robin
//! - **Type Safety** - Strongly typed CQL values with strict codecs
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use basalt_driver::{Cluster, ClusterConfig, CqlValue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClusterConfig::builder()
//!         .known_node("10.0.0.1:9042")
//!         .use_keyspace("basic")
//!         .build();
//!     let cluster = Cluster::new(config)?;
//!     let session = cluster.connect().await?;
//!
//!     // Simple statement
//!     session
//!         .execute("INSERT INTO basic (a, b, c) VALUES (1, 2, 'abc')", &[])
//!         .await?;
//!
//!     // Prepared statement, executed with bound values
//!     let prepared = session
//!         .prepare("INSERT INTO basic (a, b, c) VALUES (?, 7, ?)")
//!         .await?;
//!     session
//!         .execute(prepared, &[CqlValue::Int(1), CqlValue::Text("x".into())])
//!         .await?;
//!
//!     // Read it back
//!     let rows = session.execute("SELECT a, b, c FROM basic", &[]).await?;
//!     for row in rows {
//!         println!("{}", row);
//!     }
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Batches
//!
//! ```rust,no_run
//! # use basalt_driver::{BatchStatement, Query, Session};
//! # async fn example(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
//! let mut batch = BatchStatement::new();
//! batch.append_statement(Query::new("INSERT INTO users (id, name) VALUES (?, ?)"));
//! batch.append_statement(session.prepare("INSERT INTO users (id, name) VALUES (?, ?)").await?);
//!
//! session
//!     .batch(
//!         &batch,
//!         &[
//!             vec![1i32.into(), "Alice".into()],
//!             vec![2i32.into(), "Bob".into()],
//!         ],
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Paging
//!
//! Large results can be consumed page by page, or as an async row stream:
//!
//! ```rust,no_run
//! # use basalt_driver::Session;
//! # async fn example(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
//! let mut pager = session.pages("SELECT a FROM big_table", vec![]);
//! while let Some(page) = pager.next_page().await? {
//!     println!("page with {} rows", page.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//!
//! ```rust,no_run
//! # use basalt_driver::Session;
//! # fn example(session: &Session) {
//! let metrics = session.metrics();
//! println!("queries: {}", metrics.get_queries_num());
//! if let Ok(p99) = metrics.get_latency_percentile_ms(99.0) {
//!     println!("p99: {} ms", p99);
//! }
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Cluster handle, session, statements, pooling, metrics
//! - [`cql`] - Low-level CQL native protocol implementation

pub mod cql;
pub mod driver;

// Re-exports for convenience
pub use cql::{
    CodecError, ColumnType, CqlDecimal, CqlDuration, CqlError, CqlValue, CqlVarint,
};
pub use driver::{
    Auth, BatchStatement, BatchType, Cluster, ClusterConfig, ClusterConfigBuilder,
    ClusterTopology, Consistency, DriverError, DriverResult, ExecutionProfile, MetricsSnapshot,
    NodeAddress, Pager, PoolConfig, PreparedStatement, Query, ResultSet, RetryConfig, Row,
    RowStream, SerialConsistency, Session, Statement, TlsOptions, TracingInfo, VerifyMode,
};
