//! Schema registry and builder.
//!
//! The builder is the single place a pipeline's shape is declared: tables in
//! declaration order plus foreign-key references. `build()` validates the
//! whole declaration set at once and returns an immutable [`Schema`], which
//! downstream components receive by reference. There is no module-level or
//! global registry.
//!
//! Validation performed at build time:
//! - every reference endpoint is a registered table,
//! - the referencing table carries the referenced table's full primary key
//!   (the identifying flag is derived from where those attributes sit),
//! - the reference edges are acyclic.

use std::collections::HashMap;
use thiserror::Error;

use crate::graph::{CycleError, DependencyGraph};
use crate::table::{Reference, TableDef};
use crate::value::{AttrName, TableName};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table `{0}` is already registered")]
    DuplicateTable(TableName),

    #[error("table `{0}` declares no primary-key attribute")]
    EmptyPrimaryKey(TableName),

    #[error("reference names unregistered table `{0}`")]
    UnknownTable(TableName),

    #[error("table `{table}` references `{upstream}`, which is not registered")]
    UnknownDependency {
        table: TableName,
        upstream: TableName,
    },

    #[error("table `{from}` references `{to}` but does not carry attribute(s) [{}]", .missing.join(", "))]
    MissingReferenceAttrs {
        from: TableName,
        to: TableName,
        missing: Vec<AttrName>,
    },

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Immutable registry of table definitions and validated references.
#[derive(Debug, Clone)]
pub struct Schema {
    tables: Vec<TableDef>,
    references: Vec<Reference>,
    index: HashMap<TableName, usize>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Rebuild the dependency graph from the declaration set. Nodes appear in
    /// table declaration order, so the derived topological order is stable.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for table in &self.tables {
            graph.add_node(&table.name);
        }
        for reference in &self.references {
            graph.add_edge(&reference.from, &reference.to, reference.identifying);
        }
        graph
    }

    pub fn topological_order(&self) -> Result<Vec<TableName>, CycleError> {
        self.dependency_graph().topological_order()
    }
}

/// Mutable declaration set; consumed by [`SchemaBuilder::build`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableDef>,
    index: HashMap<TableName, usize>,
    /// `(from, to)` pairs; validated and flagged at build time so forward
    /// references are allowed.
    references: Vec<(TableName, TableName)>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Fails fast on duplicates and empty primary keys.
    pub fn table(&mut self, def: TableDef) -> Result<&mut Self, SchemaError> {
        if self.index.contains_key(&def.name) {
            return Err(SchemaError::DuplicateTable(def.name));
        }
        if def.primary_key.is_empty() {
            return Err(SchemaError::EmptyPrimaryKey(def.name));
        }
        self.index.insert(def.name.clone(), self.tables.len());
        self.tables.push(def);
        Ok(self)
    }

    /// Declare a foreign key from `from` to `to`. Endpoints may be registered
    /// later; everything is checked in [`build`](Self::build).
    pub fn reference(&mut self, from: &str, to: &str) -> &mut Self {
        self.references.push((from.to_string(), to.to_string()));
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut references = Vec::with_capacity(self.references.len());

        for (from, to) in &self.references {
            let from_def = self
                .index
                .get(from)
                .map(|&i| &self.tables[i])
                .ok_or_else(|| SchemaError::UnknownTable(from.clone()))?;
            let to_def = self
                .index
                .get(to)
                .map(|&i| &self.tables[i])
                .ok_or_else(|| SchemaError::UnknownDependency {
                    table: from.clone(),
                    upstream: to.clone(),
                })?;

            let missing: Vec<AttrName> = to_def
                .primary_key
                .iter()
                .filter(|attr| !from_def.has_attr(attr))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(SchemaError::MissingReferenceAttrs {
                    from: from.clone(),
                    to: to.clone(),
                    missing,
                });
            }

            let identifying = to_def
                .primary_key
                .iter()
                .all(|attr| from_def.is_key_attr(attr));
            references.push(Reference {
                from: from.clone(),
                to: to.clone(),
                identifying,
            });
        }

        let schema = Schema {
            tables: self.tables,
            references,
            index: self.index,
        };

        // Surface cycles at build time, before any population happens.
        schema.topological_order()?;
        Ok(schema)
    }
}
