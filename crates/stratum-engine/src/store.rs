//! The relational store boundary and the bundled in-memory implementation.
//!
//! The engine only ever asks a store for five things: table creation, atomic
//! row insertion (single- and multi-table units), full scans, and key
//! existence. Joins, restrictions, and diffs run engine-side on scanned
//! [`Relation`]s, so any backend that can enforce primary-key uniqueness and
//! per-unit atomicity can sit behind [`Store`].
//!
//! [`MemoryStore`] is the reference backend: tables behind one
//! `parking_lot::RwLock`, rows ordered by key, inserts validated and staged
//! before anything is applied so a rejected unit leaves no trace. Duplicate
//! keys surface as a typed [`StoreError::DuplicateKey`]; under concurrent
//! populate calls that rejection *is* the at-most-once reservation protocol,
//! not a failure.
//!
//! Snapshots serialize every table (definition + rows) to pretty JSON, in the
//! spirit of a changelog a human can read and diff.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

use stratum_schema::{Key, Row, TableDef, TableName};

use crate::relation::Relation;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown table `{0}`")]
    UnknownTable(TableName),

    #[error("table `{0}` already exists with a different definition")]
    DefinitionMismatch(TableName),

    #[error("table `{table}` has no attribute `{attr}`")]
    UnknownAttribute { table: TableName, attr: String },

    #[error("table `{table}`: row is missing key attribute `{attr}`")]
    MissingKeyAttribute { table: TableName, attr: String },

    #[error("table `{table}`: row is missing non-nullable attribute `{attr}`")]
    MissingAttribute { table: TableName, attr: String },

    #[error("table `{table}`: duplicate key {key}")]
    DuplicateKey { table: TableName, key: Key },

    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The external relational collaborator.
///
/// `insert_unit` is the contract everything else leans on: either every row
/// of the unit lands, or none do, and a primary-key collision anywhere in the
/// unit rejects it with [`StoreError::DuplicateKey`].
pub trait Store: Send + Sync {
    fn create_table(&self, def: &TableDef) -> Result<(), StoreError>;

    /// Insert rows into one table as a single atomic unit.
    fn insert(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        self.insert_unit(vec![(table.to_string(), rows)])
    }

    /// Insert into several tables as a single atomic unit.
    fn insert_unit(&self, writes: Vec<(TableName, Vec<Row>)>) -> Result<(), StoreError>;

    /// All rows of a table as a relation over the table's declared attributes.
    fn scan(&self, table: &str) -> Result<Relation, StoreError>;

    fn exists(&self, table: &str, key: &Key) -> Result<bool, StoreError>;
}

/// Shared handles are stores too, so several pipelines (or several workers)
/// can sit on one backend.
impl<T: Store + ?Sized> Store for std::sync::Arc<T> {
    fn create_table(&self, def: &TableDef) -> Result<(), StoreError> {
        (**self).create_table(def)
    }

    fn insert_unit(&self, writes: Vec<(TableName, Vec<Row>)>) -> Result<(), StoreError> {
        (**self).insert_unit(writes)
    }

    fn scan(&self, table: &str) -> Result<Relation, StoreError> {
        (**self).scan(table)
    }

    fn exists(&self, table: &str, key: &Key) -> Result<bool, StoreError> {
        (**self).exists(table, key)
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Clone)]
struct TableData {
    def: TableDef,
    rows: BTreeMap<Key, Row>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<TableName, TableData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_names(&self) -> Vec<TableName> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        let tables = self.tables.read();
        let data = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(data.rows.len())
    }

    /// Write every table (definition + rows, key-ordered) as pretty JSON.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let tables = self.tables.read();
        let snapshot = Snapshot {
            tables: tables
                .values()
                .map(|data| TableSnapshot {
                    def: data.def.clone(),
                    rows: data.rows.values().cloned().collect(),
                })
                .collect(),
        };
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, &snapshot)?;
        Ok(())
    }

    /// Rebuild a store from a snapshot, re-deriving the key index from each
    /// table's primary key.
    pub fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        let file = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(file)?;
        let store = MemoryStore::new();
        {
            let mut tables = store.tables.write();
            for table in snapshot.tables {
                let mut rows = BTreeMap::new();
                for row in table.rows {
                    let key = row_key(&table.def, &row)?;
                    if rows.insert(key.clone(), row).is_some() {
                        return Err(StoreError::DuplicateKey {
                            table: table.def.name.clone(),
                            key,
                        });
                    }
                }
                tables.insert(
                    table.def.name.clone(),
                    TableData {
                        def: table.def,
                        rows,
                    },
                );
            }
        }
        Ok(store)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    tables: Vec<TableSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableSnapshot {
    def: TableDef,
    rows: Vec<Row>,
}

fn row_key(def: &TableDef, row: &Row) -> Result<Key, StoreError> {
    match row.key(&def.primary_key) {
        Some(key) => Ok(key),
        None => {
            let attr = def
                .primary_key
                .iter()
                .find(|a| !row.contains_attr(a))
                .cloned()
                .unwrap_or_default();
            Err(StoreError::MissingKeyAttribute {
                table: def.name.clone(),
                attr,
            })
        }
    }
}

fn validate_row(def: &TableDef, row: &Row) -> Result<Key, StoreError> {
    for attr in row.attr_names() {
        if !def.has_attr(attr) {
            return Err(StoreError::UnknownAttribute {
                table: def.name.clone(),
                attr: attr.clone(),
            });
        }
    }
    for attr in &def.secondary {
        if !attr.nullable && !row.contains_attr(&attr.name) {
            return Err(StoreError::MissingAttribute {
                table: def.name.clone(),
                attr: attr.name.clone(),
            });
        }
    }
    row_key(def, row)
}

impl Store for MemoryStore {
    fn create_table(&self, def: &TableDef) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.get(&def.name) {
            // Re-registering the same definition is fine (snapshot reload);
            // a different shape under the same name is not.
            if existing.def != *def {
                return Err(StoreError::DefinitionMismatch(def.name.clone()));
            }
            return Ok(());
        }
        tables.insert(
            def.name.clone(),
            TableData {
                def: def.clone(),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn insert_unit(&self, writes: Vec<(TableName, Vec<Row>)>) -> Result<(), StoreError> {
        // Merge per table so a unit naming a table twice still gets checked
        // as one batch.
        let mut merged: BTreeMap<TableName, Vec<Row>> = BTreeMap::new();
        for (table, rows) in writes {
            merged.entry(table).or_default().extend(rows);
        }

        let mut tables = self.tables.write();

        // Stage 1: validate everything against the current state. Nothing is
        // applied until the whole unit is known to fit.
        let mut staged: Vec<(TableName, Vec<(Key, Row)>)> = Vec::new();
        for (table, rows) in &merged {
            let data = tables
                .get(table)
                .ok_or_else(|| StoreError::UnknownTable(table.clone()))?;
            let mut batch = Vec::with_capacity(rows.len());
            let mut batch_keys = BTreeMap::new();
            for row in rows {
                let key = validate_row(&data.def, row)?;
                if data.rows.contains_key(&key) || batch_keys.insert(key.clone(), ()).is_some() {
                    return Err(StoreError::DuplicateKey {
                        table: table.clone(),
                        key,
                    });
                }
                batch.push((key, row.clone()));
            }
            staged.push((table.clone(), batch));
        }

        // Stage 2: apply.
        for (table, batch) in staged {
            if let Some(data) = tables.get_mut(&table) {
                for (key, row) in batch {
                    data.rows.insert(key, row);
                }
            }
        }
        Ok(())
    }

    fn scan(&self, table: &str) -> Result<Relation, StoreError> {
        let tables = self.tables.read();
        let data = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let mut rel = Relation::new(data.def.attr_names().cloned());
        for row in data.rows.values() {
            rel.push(row.clone());
        }
        Ok(rel)
    }

    fn exists(&self, table: &str, key: &Key) -> Result<bool, StoreError> {
        let tables = self.tables.read();
        let data = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(data.rows.contains_key(key))
    }
}
