//! The pipeline context object: schema + store + per-table producers.
//!
//! A [`Pipeline`] is built once from a [`PipelineBuilder`] declaration set
//! and then threaded by reference through every engine call; there is no
//! ambient registry or global connection. The builder validates the whole
//! shape up front (schema references, acyclicity, key-source and completion
//! wiring) and creates the tables in the store, so a pipeline that builds is
//! a pipeline whose every table can be resolved.
//!
//! Population order is the caller's responsibility; [`Pipeline::populate_all`]
//! is the convenience that walks the dependency graph's topological order and
//! populates each computed table once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use stratum_schema::{Row, Schema, SchemaBuilder, SchemaError, TableDef, TableKind, TableName};

use crate::aggregate::CompletionSpec;
use crate::error::EngineError;
use crate::keysource::{self, KeySource, ResolveContext};
use crate::make::Make;
use crate::populate::{self, PopulateOptions, PopulateReport};
use crate::relation::Relation;
use crate::store::Store;

/// How a computed table's rows come to be.
pub(crate) enum Producer {
    /// User callback per key.
    Make {
        source: KeySource,
        make: Arc<dyn Make>,
    },
    /// Completion gate: aggregate row + part rows once the group is whole.
    Completion {
        source: KeySource,
        spec: CompletionSpec,
        part: TableName,
    },
}

impl Producer {
    pub(crate) fn key_source(&self) -> &KeySource {
        match self {
            Producer::Make { source, .. } => source,
            Producer::Completion { source, .. } => source,
        }
    }

    fn referenced_tables(&self) -> Vec<&TableName> {
        match self {
            Producer::Make { source, .. } => source.referenced_tables().collect(),
            Producer::Completion { source, spec, part } => source
                .referenced_tables()
                .chain([&spec.expected, &spec.actual, part])
                .collect(),
        }
    }
}

/// Declaration set for a pipeline. The registration method fixes each
/// table's kind, whatever the passed definition says.
#[derive(Default)]
pub struct PipelineBuilder {
    schema: SchemaBuilder,
    producers: Vec<(TableName, Producer)>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manually-populated table.
    pub fn entity(&mut self, def: TableDef) -> Result<&mut Self, EngineError> {
        let def = TableDef {
            kind: TableKind::Entity,
            ..def
        };
        self.schema.table(def)?;
        Ok(self)
    }

    /// Register a computed table with its key source and callback.
    pub fn computed(
        &mut self,
        def: TableDef,
        source: KeySource,
        make: impl Make + 'static,
    ) -> Result<&mut Self, EngineError> {
        let def = TableDef {
            kind: TableKind::Computed,
            ..def
        };
        let name = def.name.clone();
        self.schema.table(def)?;
        self.producers.push((
            name,
            Producer::Make {
                source,
                make: Arc::new(make),
            },
        ));
        Ok(self)
    }

    /// Register a completion table with its part table. The part's reference
    /// to its parent is structural and added here; its primary key must
    /// extend the parent's.
    pub fn completion(
        &mut self,
        def: TableDef,
        part: TableDef,
        source: KeySource,
        spec: CompletionSpec,
    ) -> Result<&mut Self, EngineError> {
        let def = TableDef {
            kind: TableKind::Computed,
            ..def
        };
        let part = TableDef {
            kind: TableKind::Part,
            ..part
        };
        let name = def.name.clone();
        let part_name = part.name.clone();
        self.schema.table(def)?;
        self.schema.table(part)?;
        self.schema.reference(&part_name, &name);
        self.producers.push((
            name,
            Producer::Completion {
                source,
                spec,
                part: part_name,
            },
        ));
        Ok(self)
    }

    /// Declare a foreign key between registered tables (forward references
    /// allowed; validated at build).
    pub fn reference(&mut self, from: &str, to: &str) -> &mut Self {
        self.schema.reference(from, to);
        self
    }

    /// Validate the declaration set, create the tables in the store, and
    /// return the immutable pipeline.
    pub fn build<S: Store>(self, store: S) -> Result<Pipeline<S>, EngineError> {
        let schema = self.schema.build()?;

        for (name, producer) in &self.producers {
            for upstream in producer.referenced_tables() {
                if !schema.contains(upstream) {
                    return Err(EngineError::UnknownDependency {
                        table: name.clone(),
                        upstream: upstream.clone(),
                    });
                }
            }
            if let Producer::Completion { part, .. } = producer {
                let def = schema
                    .table(name)
                    .ok_or_else(|| EngineError::UnknownTable(name.clone()))?;
                let part_def = schema
                    .table(part)
                    .ok_or_else(|| EngineError::UnknownTable(part.clone()))?;
                for attr in &def.primary_key {
                    if !part_def.is_key_attr(attr) {
                        return Err(EngineError::PartKey {
                            table: part.clone(),
                            attr: attr.clone(),
                        });
                    }
                }
            }
        }

        for def in schema.tables() {
            store.create_table(def)?;
        }

        Ok(Pipeline {
            schema,
            store,
            producers: self.producers.into_iter().collect(),
        })
    }
}

pub struct Pipeline<S: Store> {
    schema: Schema,
    store: S,
    producers: HashMap<TableName, Producer>,
}

impl<S: Store + fmt::Debug> fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("schema", &self.schema)
            .field("store", &self.store)
            .field("producers", &self.producers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: Store> Pipeline<S> {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn producer(&self, table: &str) -> Option<&Producer> {
        self.producers.get(table)
    }

    pub(crate) fn resolve_context<'a>(&'a self, table: &'a str) -> ResolveContext<'a> {
        ResolveContext {
            table,
            schema: &self.schema,
            store: &self.store,
        }
    }

    /// Insert externally-owned rows. Computed, completion, and part tables
    /// are engine-produced and reject external inserts.
    pub fn insert(&self, table: &str, rows: Vec<Row>) -> Result<(), EngineError> {
        let def = self
            .schema
            .table(table)
            .ok_or_else(|| EngineError::UnknownTable(table.to_string()))?;
        if !matches!(def.kind, TableKind::Entity) {
            return Err(EngineError::NotEntity(table.to_string()));
        }
        self.store.insert(table, rows)?;
        Ok(())
    }

    /// The candidate keys currently eligible for `table`, as a relation over
    /// the table's primary-key attributes.
    pub fn resolve(&self, table: &str) -> Result<Relation, EngineError> {
        let def = self
            .schema
            .table(table)
            .ok_or_else(|| EngineError::UnknownTable(table.to_string()))?;
        let producer = self
            .producer(table)
            .ok_or_else(|| EngineError::NotComputed(table.to_string()))?;
        let ctx = self.resolve_context(&def.name);
        keysource::resolve(def, producer.key_source(), &ctx)
    }

    pub fn populate(&self, table: &str) -> Result<PopulateReport, EngineError> {
        populate::execute(self, table, &PopulateOptions::default())
    }

    pub fn populate_with(
        &self,
        table: &str,
        options: &PopulateOptions,
    ) -> Result<PopulateReport, EngineError> {
        populate::execute(self, table, options)
    }

    /// Populate every computed table once, in topological order.
    pub fn populate_all(&self) -> Result<Vec<PopulateReport>, EngineError> {
        self.populate_all_with(&PopulateOptions::default())
    }

    pub fn populate_all_with(
        &self,
        options: &PopulateOptions,
    ) -> Result<Vec<PopulateReport>, EngineError> {
        let order = self.topological_order()?;
        let mut reports = Vec::with_capacity(self.producers.len());
        for table in order {
            if self.producers.contains_key(&table) {
                reports.push(populate::execute(self, &table, options)?);
            }
        }
        Ok(reports)
    }

    pub fn topological_order(&self) -> Result<Vec<TableName>, EngineError> {
        Ok(self
            .schema
            .topological_order()
            .map_err(SchemaError::from)?)
    }
}
