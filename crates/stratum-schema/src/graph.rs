//! Dependency graph over tables, with deterministic topological ordering.
//!
//! An edge `(from, to)` means "`from` depends on `to`": `to` must be
//! populated before `from` for `from`'s key source to see correct upstream
//! state. The graph is pure data; it never touches a store.
//!
//! Ordering is deterministic: nodes are numbered by first mention, and the
//! topological sort always picks the lowest-numbered ready node next, so
//! repeated calls on an unchanged graph yield the same linearization.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::value::TableName;

/// The edge set is not acyclic. Lists the tables stuck on the cycle (in
/// declaration order).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle among tables [{}]", .tables.join(", "))]
pub struct CycleError {
    pub tables: Vec<TableName>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<TableName>,
    index: HashMap<TableName, usize>,
    /// `(from, to, identifying)` by node index.
    edges: Vec<(usize, usize, bool)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node; first mention fixes its declaration order. Idempotent.
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(name.to_string());
        self.index.insert(name.to_string(), i);
        i
    }

    /// Declare that `from` depends on `to`. Unknown names are registered on
    /// first mention.
    pub fn add_edge(&mut self, from: &str, to: &str, identifying: bool) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        self.edges.push((from, to, identifying));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn nodes(&self) -> &[TableName] {
        &self.nodes
    }

    /// Upstream tables `name` depends on, in edge-declaration order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        let Some(&i) = self.index.get(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|(from, _, _)| *from == i)
            .filter(|(_, to, _)| seen.insert(*to))
            .map(|(_, to, _)| self.nodes[*to].as_str())
            .collect()
    }

    /// Downstream tables that depend on `name`, in edge-declaration order.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        let Some(&i) = self.index.get(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|(_, to, _)| *to == i)
            .filter(|(from, _, _)| seen.insert(*from))
            .map(|(from, _, _)| self.nodes[*from].as_str())
            .collect()
    }

    /// A valid linearization: for every edge `(from, to)`, `to` precedes
    /// `from`. Ties among mutually independent tables break by declaration
    /// order.
    pub fn topological_order(&self) -> Result<Vec<TableName>, CycleError> {
        let n = self.nodes.len();
        let mut remaining_deps = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        // Duplicate edges (a table may reference the same upstream through
        // more than one foreign key) must not inflate the dependency count.
        let mut seen = HashSet::new();
        for &(from, to, _) in &self.edges {
            if seen.insert((from, to)) {
                remaining_deps[from] += 1;
                dependents[to].push(from);
            }
        }

        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);
        while order.len() < n {
            let Some(next) = (0..n).find(|&i| !emitted[i] && remaining_deps[i] == 0) else {
                break;
            };
            emitted[next] = true;
            order.push(self.nodes[next].clone());
            for &d in &dependents[next] {
                remaining_deps[d] -= 1;
            }
        }

        if order.len() != n {
            let tables = (0..n)
                .filter(|&i| !emitted[i])
                .map(|i| self.nodes[i].clone())
                .collect();
            return Err(CycleError { tables });
        }
        Ok(order)
    }
}
