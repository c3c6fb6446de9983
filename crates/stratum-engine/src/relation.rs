//! In-memory relations and the operations key-source resolution needs.
//!
//! A [`Relation`] is a declared attribute set plus a bag of rows. The
//! declared set matters for null semantics: a row that lacks a value for a
//! declared attribute holds null there, and null never compares equal, so a
//! join over a shared attribute silently drops rows with a null on either
//! side, and a restriction by key drops rows missing a constrained value.
//! The parameter-set indirection pattern leans on exactly this: a null stage
//! slot keeps the row out of that stage's join.
//!
//! Operations provided: natural join, projection (with dedup), restriction
//! by partial key, semijoin, antijoin. Joins hash on the shared-attribute
//! value vector; projection normalizes row order so downstream key sets are
//! deterministic.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use stratum_schema::{AttrName, Key, Row, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    attrs: BTreeSet<AttrName>,
    rows: Vec<Row>,
}

impl Relation {
    pub fn new<I, S>(attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AttrName>,
    {
        Relation {
            attrs: attrs.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows must only carry declared attributes; callers are trusted.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn attrs(&self) -> &BTreeSet<AttrName> {
        &self.attrs
    }

    pub fn contains_attr(&self, attr: &str) -> bool {
        self.attrs.contains(attr)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep the listed attributes (those actually declared), dropping
    /// duplicate rows and normalizing row order.
    pub fn project(&self, attrs: &[AttrName]) -> Relation {
        let kept: Vec<AttrName> = attrs
            .iter()
            .filter(|a| self.attrs.contains(a.as_str()))
            .cloned()
            .collect();
        let mut rows = BTreeSet::new();
        for row in &self.rows {
            rows.insert(row.project(&kept));
        }
        Relation {
            attrs: kept.into_iter().collect(),
            rows: rows.into_iter().collect(),
        }
    }

    /// Natural join on the shared attributes. With no shared attributes this
    /// is the cross product. Rows with a null (absent) shared attribute never
    /// match.
    pub fn natural_join(&self, other: &Relation) -> Relation {
        let shared: Vec<AttrName> = self.attrs.intersection(&other.attrs).cloned().collect();
        let attrs: BTreeSet<AttrName> = self.attrs.union(&other.attrs).cloned().collect();
        let mut rows = Vec::new();

        if shared.is_empty() {
            for left in &self.rows {
                for right in &other.rows {
                    rows.push(merge(left, right));
                }
            }
            return Relation { attrs, rows };
        }

        let mut index: AHashMap<Vec<Value>, Vec<&Row>> = AHashMap::new();
        for right in &other.rows {
            if let Some(values) = join_values(right, &shared) {
                index.entry(values).or_default().push(right);
            }
        }
        for left in &self.rows {
            let Some(values) = join_values(left, &shared) else {
                continue;
            };
            if let Some(matches) = index.get(&values) {
                for right in matches {
                    rows.push(merge(left, right));
                }
            }
        }
        Relation { attrs, rows }
    }

    /// Rows of `self` that have at least one join partner in `other`.
    pub fn semijoin(&self, other: &Relation) -> Relation {
        let shared: Vec<AttrName> = self.attrs.intersection(&other.attrs).cloned().collect();
        if shared.is_empty() {
            let rows = if other.rows.is_empty() {
                Vec::new()
            } else {
                self.rows.clone()
            };
            return Relation {
                attrs: self.attrs.clone(),
                rows,
            };
        }

        let index: AHashSet<Vec<Value>> = other
            .rows
            .iter()
            .filter_map(|row| join_values(row, &shared))
            .collect();
        let rows = self
            .rows
            .iter()
            .filter(|row| {
                join_values(row, &shared).is_some_and(|values| index.contains(&values))
            })
            .cloned()
            .collect();
        Relation {
            attrs: self.attrs.clone(),
            rows,
        }
    }

    /// Rows of `self` with no join partner in `other`: the set difference
    /// the populate diff runs on.
    pub fn antijoin(&self, other: &Relation) -> Relation {
        let shared: Vec<AttrName> = self.attrs.intersection(&other.attrs).cloned().collect();
        if shared.is_empty() {
            let rows = if other.rows.is_empty() {
                self.rows.clone()
            } else {
                Vec::new()
            };
            return Relation {
                attrs: self.attrs.clone(),
                rows,
            };
        }

        let index: AHashSet<Vec<Value>> = other
            .rows
            .iter()
            .filter_map(|row| join_values(row, &shared))
            .collect();
        let rows = self
            .rows
            .iter()
            .filter(|row| match join_values(row, &shared) {
                Some(values) => !index.contains(&values),
                None => true,
            })
            .cloned()
            .collect();
        Relation {
            attrs: self.attrs.clone(),
            rows,
        }
    }

    /// Rows matching a (possibly partial) key: every key attribute that is
    /// declared here must be present and equal.
    pub fn restrict(&self, key: &Key) -> Relation {
        let constrained: Vec<&AttrName> = key
            .attr_names()
            .filter(|a| self.attrs.contains(a.as_str()))
            .collect();
        let rows = self
            .rows
            .iter()
            .filter(|row| {
                constrained
                    .iter()
                    .all(|attr| row.get(attr) == key.get(attr))
            })
            .cloned()
            .collect();
        Relation {
            attrs: self.attrs.clone(),
            rows,
        }
    }

    /// Distinct primary-key tuples, sorted. Rows missing a key attribute are
    /// skipped.
    pub fn keys(&self, primary_key: &[AttrName]) -> Vec<Key> {
        let mut out = BTreeSet::new();
        for row in &self.rows {
            if let Some(key) = row.key(primary_key) {
                out.insert(key);
            }
        }
        out.into_iter().collect()
    }
}

fn join_values(row: &Row, shared: &[AttrName]) -> Option<Vec<Value>> {
    shared.iter().map(|attr| row.get(attr).cloned()).collect()
}

fn merge(left: &Row, right: &Row) -> Row {
    let mut out = left.clone();
    for (attr, value) in right.iter() {
        out.insert(attr, value.clone());
    }
    out
}
