//! CQL message types.
//!
//! Requests encode their bodies; responses decode theirs. Both directions
//! are implemented symmetrically so an in-process peer can exercise the
//! full wire without a live cluster.

mod request;
mod response;

pub use request::{
    startup_options, BatchQuery, QueryParameters, Request, CQL_VERSION, EVENT_SCHEMA_CHANGE,
    EVENT_STATUS_CHANGE, EVENT_TOPOLOGY_CHANGE, OPT_CQL_VERSION, OPT_DRIVER_NAME,
    OPT_DRIVER_VERSION,
};
pub use response::{
    ColumnSpec, ErrorBody, ErrorDetails, EventBody, PreparedBody, Response, ResultBody, RowsPage,
    SchemaChange,
};
