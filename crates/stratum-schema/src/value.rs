//! Attribute values, keys, and rows.
//!
//! The engine moves data around as flat attribute maps:
//!
//! - a [`Key`] holds exactly a table's primary-key attributes and is the unit
//!   of population,
//! - a [`Row`] holds the primary-key attributes plus any subset of the
//!   secondary attributes.
//!
//! Null is represented by *absence*: a row that has no value for a nullable
//! secondary attribute simply does not carry that attribute. There is no null
//! variant in [`Value`], so a present attribute always compares by value.
//!
//! Both maps are `BTreeMap`-backed so that keys order deterministically;
//! sorted key sets are what make repeated populate runs process work in a
//! stable order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type AttrName = String;
pub type TableName = String;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Int(_) => None,
            Value::Text(s) => Some(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

// ============================================================================
// Key
// ============================================================================

/// A primary-key tuple: attribute name -> value, restricted to a table's
/// primary-key attributes.
///
/// Keys are totally ordered (attribute-wise), which gives populate runs their
/// deterministic per-key order.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Key {
    attrs: BTreeMap<AttrName, Value>,
}

impl Key {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion: `Key::new().with("name", "acq_0").with("rnd", 0)`.
    pub fn with(mut self, attr: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(attr.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, attr: &str, value: impl Into<Value>) {
        self.attrs.insert(attr.to_string(), value.into());
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attrs.get(attr)
    }

    pub fn contains_attr(&self, attr: &str) -> bool {
        self.attrs.contains_key(attr)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttrName, &Value)> {
        self.attrs.iter()
    }

    pub fn attr_names(&self) -> impl Iterator<Item = &AttrName> {
        self.attrs.keys()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (attr, value)) in self.attrs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{attr}={value}")?;
        }
        write!(f, ")")
    }
}

// ============================================================================
// Row
// ============================================================================

/// A full row: primary-key attributes plus present secondary attributes.
///
/// A secondary attribute that is null for this row is absent from the map.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<AttrName, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// A row carrying exactly the key's attributes. The common case for
    /// computed tables whose rows have no secondary attributes.
    pub fn from_key(key: &Key) -> Self {
        let mut row = Row::new();
        for (attr, value) in key.iter() {
            row.values.insert(attr.clone(), value.clone());
        }
        row
    }

    pub fn with(mut self, attr: &str, value: impl Into<Value>) -> Self {
        self.values.insert(attr.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, attr: &str, value: impl Into<Value>) {
        self.values.insert(attr.to_string(), value.into());
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.values.get(attr)
    }

    pub fn contains_attr(&self, attr: &str) -> bool {
        self.values.contains_key(attr)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttrName, &Value)> {
        self.values.iter()
    }

    pub fn attr_names(&self) -> impl Iterator<Item = &AttrName> {
        self.values.keys()
    }

    /// The row's primary-key projection, or `None` if any key attribute is
    /// missing from the row.
    pub fn key(&self, primary_key: &[AttrName]) -> Option<Key> {
        let mut key = Key::new();
        for attr in primary_key {
            key.insert(attr, self.values.get(attr)?.clone());
        }
        Some(key)
    }

    /// Keep only the listed attributes; missing ones are skipped (null).
    pub fn project(&self, attrs: &[AttrName]) -> Row {
        let mut out = Row::new();
        for attr in attrs {
            if let Some(value) = self.values.get(attr) {
                out.values.insert(attr.clone(), value.clone());
            }
        }
        out
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (attr, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{attr}={value}")?;
        }
        write!(f, ")")
    }
}
