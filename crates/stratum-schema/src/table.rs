//! Table definitions and foreign-key references.
//!
//! A [`TableDef`] is purely declarative: a name, a kind, an ordered primary
//! key, and ordered secondary attributes. Behavior (key sources, callbacks)
//! is attached engine-side; the schema crate only records shape.
//!
//! A [`Reference`] records a foreign key from one table to another. The
//! referencing table must itself carry the referenced table's primary-key
//! attributes; whether those attributes sit inside the referencing table's
//! own primary key decides the *identifying* flag (the referencing table
//! extends the referenced key) versus a plain secondary reference.

use serde::{Deserialize, Serialize};

use crate::value::{AttrName, TableName};

/// How a table's rows come to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Rows inserted by external callers; never produced by the engine.
    Entity,
    /// Rows produced exclusively by the populate executor.
    Computed,
    /// Rows written only as a cascade of a completion table's insert.
    Part,
}

/// A secondary (non-identifying) attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrDef {
    pub name: AttrName,
    /// Nullable attributes may be absent from a row. Parameter-set slot
    /// attributes are the canonical case: a null slot opts the row out of
    /// the corresponding stage.
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: TableName,
    pub kind: TableKind,
    pub primary_key: Vec<AttrName>,
    pub secondary: Vec<AttrDef>,
}

impl TableDef {
    fn new(name: &str, kind: TableKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            primary_key: Vec::new(),
            secondary: Vec::new(),
        }
    }

    pub fn entity(name: &str) -> Self {
        Self::new(name, TableKind::Entity)
    }

    pub fn computed(name: &str) -> Self {
        Self::new(name, TableKind::Computed)
    }

    pub fn part(name: &str) -> Self {
        Self::new(name, TableKind::Part)
    }

    /// Append a primary-key attribute (declaration order is kept).
    pub fn with_key_attr(mut self, attr: &str) -> Self {
        self.primary_key.push(attr.to_string());
        self
    }

    /// Append a non-nullable secondary attribute.
    pub fn with_attr(mut self, attr: &str) -> Self {
        self.secondary.push(AttrDef {
            name: attr.to_string(),
            nullable: false,
        });
        self
    }

    /// Append a nullable secondary attribute.
    pub fn with_nullable_attr(mut self, attr: &str) -> Self {
        self.secondary.push(AttrDef {
            name: attr.to_string(),
            nullable: true,
        });
        self
    }

    pub fn attr_names(&self) -> impl Iterator<Item = &AttrName> {
        self.primary_key
            .iter()
            .chain(self.secondary.iter().map(|a| &a.name))
    }

    pub fn has_attr(&self, attr: &str) -> bool {
        self.attr_names().any(|a| a == attr)
    }

    pub fn is_key_attr(&self, attr: &str) -> bool {
        self.primary_key.iter().any(|a| a == attr)
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.kind, TableKind::Computed)
    }
}

/// A foreign key: `from` carries `to`'s full primary key among its
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub from: TableName,
    pub to: TableName,
    /// True when all of `to`'s primary-key attributes are part of `from`'s
    /// own primary key.
    pub identifying: bool,
}
