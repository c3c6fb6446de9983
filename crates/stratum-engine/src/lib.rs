//! Stratum computation engine.
//!
//! Incremental computation over a relational dependency graph: entity tables
//! hold externally-inserted rows, computed tables derive theirs by running a
//! callback over every key their key source implies that they do not hold
//! yet. Population is idempotent and append-only: a key is computed at most
//! once in a table's lifetime, and re-running populate over an unchanged
//! pipeline inserts nothing.
//!
//! The pieces, leaf-first:
//! - [`relation`]: join/project/restrict/antijoin over scanned rows,
//! - [`store`]: the relational-store seam plus the bundled [`MemoryStore`],
//! - [`keysource`]: candidate-key resolution with composable restrictions
//!   (the parameter-set indirection pattern ships as [`ParamMixin`]),
//! - [`populate`]: the per-key execute-and-insert loop with batch reporting,
//! - [`aggregate`]: completion gating with cascaded part rows,
//! - [`pipeline`]: the explicit context object tying schema, store, and
//!   producers together.
//!
//! Table shape (definitions, references, dependency graph) comes from
//! `stratum-schema`.

pub mod aggregate;
pub mod error;
pub mod keysource;
pub mod make;
pub mod pipeline;
pub mod populate;
pub mod relation;
pub mod store;

pub use aggregate::CompletionSpec;
pub use error::EngineError;
pub use keysource::{KeySource, KeySourceFilter, ParamMixin, ResolveContext};
pub use make::{insert_key, Make, MakeOutput};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use populate::{KeyFailure, PopulateOptions, PopulateReport};
pub use relation::Relation;
pub use store::{MemoryStore, Store, StoreError};
