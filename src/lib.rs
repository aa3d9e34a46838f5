//! docmodel - schema-driven document modeling over a remote
//! key-value/wide-column store
//!
//! Maps application-level schemas to wire-format records and back, and
//! translates high-level query conditions into the store's native request
//! grammar. The store itself is a thin, swappable transport collaborator;
//! the substance of this crate is the type-resolution engine, the
//! bidirectional conformance pipeline, and the index planner.

pub mod conform;
pub mod merge;
pub mod model;
pub mod observability;
pub mod path;
pub mod planner;
pub mod schema;
pub mod transport;
pub mod wire;
