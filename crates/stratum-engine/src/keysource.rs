//! Key-source recipes and resolution.
//!
//! A computed table's key source names the upstream tables whose natural
//! join (each projected to its own primary key first) spans the candidate
//! key set, plus an ordered chain of restriction strategies applied to that
//! base. Resolution is pure (scan, join, filter, project), no mutation.
//!
//! [`ParamMixin`] is the bundled restriction for the parameter-set
//! indirection pattern: semijoin the base against the natural join of a
//! processing (binding) table and a parameter-set table. The parameter-set
//! table's per-stage slots are nullable foreign keys, and a null slot is an
//! absent attribute, so the join drops parameter sets that opted out of the
//! current stage; entities bound only to such sets never become candidates.
//! Because the surviving keys are finally projected to the computed table's
//! own primary key (which carries the *parameter table's* key attribute, not
//! the indirection name), two parameter sets naming the same parameter row
//! collapse into one candidate.

use std::fmt;

use stratum_schema::{AttrName, Schema, TableDef, TableName};

use crate::error::EngineError;
use crate::relation::Relation;
use crate::store::Store;

/// Read-only resolution environment handed to restriction strategies.
pub struct ResolveContext<'a> {
    pub(crate) table: &'a str,
    pub(crate) schema: &'a Schema,
    pub(crate) store: &'a dyn Store,
}

impl ResolveContext<'_> {
    pub fn schema(&self) -> &Schema {
        self.schema
    }

    /// Scan an upstream table, failing if it is not part of the schema.
    pub fn scan(&self, table: &str) -> Result<Relation, EngineError> {
        if !self.schema.contains(table) {
            return Err(EngineError::UnknownDependency {
                table: self.table.to_string(),
                upstream: table.to_string(),
            });
        }
        Ok(self.store.scan(table)?)
    }
}

/// A restriction strategy: take the base candidate relation, return a
/// filtered one. Attached to a table's key source, composable in order.
pub trait KeySourceFilter: Send + Sync {
    /// Tables the filter scans; checked against the schema at build time.
    fn referenced_tables(&self) -> &[TableName];

    fn apply(&self, base: Relation, ctx: &ResolveContext<'_>) -> Result<Relation, EngineError>;
}

/// Declarative key-source recipe for one computed table.
pub struct KeySource {
    base: Vec<TableName>,
    filters: Vec<Box<dyn KeySourceFilter>>,
}

impl KeySource {
    /// Natural join of the named upstream tables.
    pub fn join<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TableName>,
    {
        KeySource {
            base: tables.into_iter().map(Into::into).collect(),
            filters: Vec::new(),
        }
    }

    /// Append a restriction strategy; filters apply in the order given.
    pub fn filtered(mut self, filter: impl KeySourceFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub(crate) fn base(&self) -> &[TableName] {
        &self.base
    }

    pub(crate) fn referenced_tables(&self) -> impl Iterator<Item = &TableName> {
        self.base
            .iter()
            .chain(self.filters.iter().flat_map(|f| f.referenced_tables()))
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySource")
            .field("base", &self.base)
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// The parameter-set indirection restriction (see module docs).
#[derive(Debug, Clone)]
pub struct ParamMixin {
    through: Vec<TableName>,
}

impl ParamMixin {
    /// Restrict through the given binding/parameter-set tables; they are
    /// natural-joined together and the base is semijoined against the result.
    pub fn through<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TableName>,
    {
        ParamMixin {
            through: tables.into_iter().map(Into::into).collect(),
        }
    }
}

impl KeySourceFilter for ParamMixin {
    fn referenced_tables(&self) -> &[TableName] {
        &self.through
    }

    fn apply(&self, base: Relation, ctx: &ResolveContext<'_>) -> Result<Relation, EngineError> {
        let mut mixin: Option<Relation> = None;
        for table in &self.through {
            let scanned = ctx.scan(table)?;
            mixin = Some(match mixin {
                None => scanned,
                Some(acc) => acc.natural_join(&scanned),
            });
        }
        match mixin {
            None => Ok(base),
            Some(mixin) => Ok(base.semijoin(&mixin)),
        }
    }
}

/// Resolve a table's candidate keys: join the base upstreams (each projected
/// to its own primary key), apply the restriction chain, then project to the
/// table's primary key with dedup. Fails if the result cannot cover the
/// table's key attributes.
pub(crate) fn resolve(
    def: &TableDef,
    source: &KeySource,
    ctx: &ResolveContext<'_>,
) -> Result<Relation, EngineError> {
    let mut rel: Option<Relation> = None;
    for upstream in source.base() {
        let updef = ctx
            .schema
            .table(upstream)
            .ok_or_else(|| EngineError::UnknownDependency {
                table: def.name.clone(),
                upstream: upstream.clone(),
            })?;
        let projected = ctx.store.scan(upstream)?.project(&updef.primary_key);
        rel = Some(match rel {
            None => projected,
            Some(acc) => acc.natural_join(&projected),
        });
    }

    let mut rel = rel.ok_or_else(|| EngineError::InvalidKeySource {
        table: def.name.clone(),
        missing: def.primary_key.clone(),
    })?;

    for filter in &source.filters {
        rel = filter.apply(rel, ctx)?;
    }

    let missing: Vec<AttrName> = def
        .primary_key
        .iter()
        .filter(|attr| !rel.contains_attr(attr.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::InvalidKeySource {
            table: def.name.clone(),
            missing,
        });
    }

    Ok(rel.project(&def.primary_key))
}
