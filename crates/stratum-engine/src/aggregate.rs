//! Completion aggregation: emit a group's row once all constituents exist.
//!
//! A completion table watches a group for two counts: how many constituents
//! the group *should* have (rows of the expected source restricted to the
//! group key) and how many have actually been computed (rows of the actual
//! source restricted the same way). The group's aggregate row, plus one part
//! row per constituent, is inserted as a single atomic unit exactly when
//! the counts agree. `0 == 0` counts as agreement: a group with no
//! constituents is trivially complete and gets an aggregate row with zero
//! part rows.
//!
//! A group whose counts disagree is skipped this round and reconsidered on
//! the next populate call; once emitted, the unit is a permanent snapshot and
//! later growth of the actual source changes nothing.

use serde::{Deserialize, Serialize};

use stratum_schema::{Key, Row, TableDef, TableName};

use crate::error::EngineError;
use crate::keysource::ResolveContext;

/// Where a completion table finds its two counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSpec {
    /// Enumerates the constituents a group should have (e.g. the raw
    /// sub-entity table).
    pub expected: TableName,
    /// Holds the constituents computed so far (e.g. the upstream computed
    /// table); also supplies the part rows' extending attributes.
    pub actual: TableName,
}

impl CompletionSpec {
    pub fn new(expected: &str, actual: &str) -> Self {
        CompletionSpec {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Build the atomic unit for one group key, or `None` while the group is
/// still incomplete.
pub(crate) fn completion_unit(
    def: &TableDef,
    part: &TableDef,
    spec: &CompletionSpec,
    key: &Key,
    ctx: &ResolveContext<'_>,
) -> Result<Option<Vec<(TableName, Vec<Row>)>>, EngineError> {
    let expected = ctx.scan(&spec.expected)?.restrict(key).len();
    let actual = ctx.scan(&spec.actual)?.restrict(key);

    if expected != actual.len() {
        tracing::debug!(
            table = %def.name,
            key = %key,
            expected,
            actual = actual.len(),
            "group incomplete; skipping this round"
        );
        return Ok(None);
    }

    let mut part_rows = Vec::with_capacity(actual.len());
    for row in actual.rows() {
        let mut part_row = Row::from_key(key);
        for attr in &part.primary_key {
            if part_row.contains_attr(attr) {
                continue;
            }
            let Some(value) = row.get(attr) else {
                return Err(EngineError::MissingPartAttr {
                    table: part.name.clone(),
                    attr: attr.clone(),
                });
            };
            part_row.insert(attr, value.clone());
        }
        part_rows.push(part_row);
    }

    Ok(Some(vec![
        (def.name.clone(), vec![Row::from_key(key)]),
        (part.name.clone(), part_rows),
    ]))
}
