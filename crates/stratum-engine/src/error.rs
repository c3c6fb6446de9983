//! Engine error taxonomy.
//!
//! Setup-time problems (schema shape, unknown dependencies, malformed key
//! sources) are fatal and surface before any population happens. Per-key
//! compute failures are *not* errors at this level: they are collected into
//! the populate report, unless fail-fast mode promotes the first one to
//! [`EngineError::Compute`]. Duplicate-key rejections from the store never
//! appear here at all; a lost insert race means another worker finished the
//! key, which is a skip, not a failure.

use thiserror::Error;

use stratum_schema::{AttrName, Key, SchemaError, TableName};

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown table `{0}`")]
    UnknownTable(TableName),

    #[error("table `{0}` cannot be populated")]
    NotComputed(TableName),

    #[error("table `{0}` is engine-produced; external inserts are limited to entity tables")]
    NotEntity(TableName),

    #[error("table `{table}` depends on `{upstream}`, which is not registered")]
    UnknownDependency {
        table: TableName,
        upstream: TableName,
    },

    #[error("key source for `{table}` does not produce attribute(s) [{}]", .missing.join(", "))]
    InvalidKeySource {
        table: TableName,
        missing: Vec<AttrName>,
    },

    #[error("part table `{table}` primary key must extend its parent's with `{attr}`")]
    PartKey { table: TableName, attr: AttrName },

    #[error("part table `{table}` attribute `{attr}` is absent from the actual-source row")]
    MissingPartAttr { table: TableName, attr: AttrName },

    #[error("compute failed for `{table}` key {key}")]
    Compute {
        table: TableName,
        key: Key,
        #[source]
        source: anyhow::Error,
    },
}
