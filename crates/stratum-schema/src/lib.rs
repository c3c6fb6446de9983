//! Stratum data model.
//!
//! This crate defines the declarative half of a stratum pipeline: attribute
//! values, keys and rows, table definitions with foreign-key references, the
//! dependency graph with deterministic topological ordering, and the schema
//! builder that validates a declaration set into an immutable [`Schema`].
//!
//! Everything here is pure data; population behavior (key sources,
//! callbacks, the store) lives in `stratum-engine`.

pub mod graph;
pub mod schema;
pub mod table;
pub mod value;

pub use graph::{CycleError, DependencyGraph};
pub use schema::{Schema, SchemaBuilder, SchemaError};
pub use table::{AttrDef, Reference, TableDef, TableKind};
pub use value::{AttrName, Key, Row, TableName, Value};
