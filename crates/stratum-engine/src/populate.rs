//! The populate executor.
//!
//! `populate` is the one engine operation that writes: diff the resolved
//! candidate keys against what the table already holds, then run each
//! remaining key through its producer (compute callback or completion gate)
//! and insert the result as one atomic unit. Keys already present are never
//! re-processed: upstream changes after a key lands are invisible by
//! design, so a second run over an unchanged pipeline inserts nothing.
//!
//! Failure handling is per key: a failing callback leaves its key absent
//! (the unit never landed, so the next run retries it), gets recorded in the
//! report, and does not disturb sibling keys unless fail-fast is requested.
//! A duplicate-key rejection is the race-lost signal of the at-most-once
//! protocol and only bumps the skipped counter.
//!
//! Remaining keys are processed in sorted key order; with
//! [`PopulateOptions::parallel`] the per-key units run on the rayon pool
//! instead, in which case fail-fast reports the first failure after the
//! in-flight wave drains (callbacks are opaque and cannot be cancelled).

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use stratum_schema::{Key, TableDef, TableName};

use crate::aggregate;
use crate::error::EngineError;
use crate::make::MakeOutput;
use crate::pipeline::{Pipeline, Producer};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateOptions {
    /// Abort on the first per-key failure instead of collecting it.
    pub fail_fast: bool,
    /// Run per-key units on the rayon thread pool.
    pub parallel: bool,
}

/// One key's recorded failure. The key stays absent from the table and is
/// retried on the next populate call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFailure {
    pub key: Key,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulateReport {
    pub table: TableName,
    /// Size of the resolved key source (before the diff).
    pub candidates: usize,
    pub inserted_keys: usize,
    pub inserted_rows: usize,
    /// No-result callbacks, incomplete groups, and race-lost inserts.
    pub skipped: usize,
    pub failures: Vec<KeyFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PopulateReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum KeyOutcome {
    Inserted { rows: usize },
    NoResult,
    Incomplete,
    RaceLost,
    Failed(anyhow::Error),
}

pub(crate) fn execute<S: Store>(
    pipeline: &Pipeline<S>,
    table: &str,
    options: &PopulateOptions,
) -> Result<PopulateReport, EngineError> {
    let started_at = Utc::now();
    let def = pipeline
        .schema()
        .table(table)
        .ok_or_else(|| EngineError::UnknownTable(table.to_string()))?;
    let producer = pipeline
        .producer(table)
        .ok_or_else(|| EngineError::NotComputed(table.to_string()))?;

    let candidates = pipeline.resolve(table)?;
    let existing = pipeline.store().scan(table)?.project(&def.primary_key);
    let remaining = candidates.antijoin(&existing).keys(&def.primary_key);
    tracing::debug!(
        table = %table,
        candidates = candidates.len(),
        existing = existing.len(),
        remaining = remaining.len(),
        "resolved populate diff"
    );

    let outcomes: Vec<(Key, KeyOutcome)> = if options.parallel {
        remaining
            .into_par_iter()
            .map(|key| {
                let outcome = run_key(pipeline, def, producer, &key);
                (key, outcome)
            })
            .collect()
    } else {
        let mut out = Vec::new();
        for key in remaining {
            let outcome = run_key(pipeline, def, producer, &key);
            let failed = matches!(outcome, KeyOutcome::Failed(_));
            out.push((key, outcome));
            if failed && options.fail_fast {
                break;
            }
        }
        out
    };

    let mut report = PopulateReport {
        table: table.to_string(),
        candidates: candidates.len(),
        inserted_keys: 0,
        inserted_rows: 0,
        skipped: 0,
        failures: Vec::new(),
        started_at,
        finished_at: started_at,
    };
    for (key, outcome) in outcomes {
        match outcome {
            KeyOutcome::Inserted { rows } => {
                report.inserted_keys += 1;
                report.inserted_rows += rows;
            }
            KeyOutcome::NoResult | KeyOutcome::Incomplete | KeyOutcome::RaceLost => {
                report.skipped += 1;
            }
            KeyOutcome::Failed(source) => {
                tracing::warn!(
                    table = %table,
                    key = %key,
                    error = %format!("{source:#}"),
                    "compute failed; key left for retry"
                );
                if options.fail_fast {
                    return Err(EngineError::Compute {
                        table: table.to_string(),
                        key,
                        source,
                    });
                }
                report.failures.push(KeyFailure {
                    key,
                    error: format!("{source:#}"),
                });
            }
        }
    }
    report.finished_at = Utc::now();
    tracing::info!(
        table = %table,
        inserted_keys = report.inserted_keys,
        inserted_rows = report.inserted_rows,
        skipped = report.skipped,
        failures = report.failures.len(),
        "populate finished"
    );
    Ok(report)
}

fn run_key<S: Store>(
    pipeline: &Pipeline<S>,
    def: &TableDef,
    producer: &Producer,
    key: &Key,
) -> KeyOutcome {
    let unit = match producer {
        Producer::Make { make, .. } => match make.make(key) {
            Err(err) => return KeyOutcome::Failed(err),
            Ok(MakeOutput::NoResult) => return KeyOutcome::NoResult,
            Ok(MakeOutput::Rows(rows)) if rows.is_empty() => return KeyOutcome::NoResult,
            Ok(MakeOutput::Rows(rows)) => {
                for row in &rows {
                    if row.key(&def.primary_key).is_none() {
                        return KeyOutcome::Failed(anyhow!(
                            "callback row {row} is missing primary-key attributes"
                        ));
                    }
                    if key.iter().any(|(attr, value)| row.get(attr) != Some(value)) {
                        return KeyOutcome::Failed(anyhow!(
                            "callback row {row} disagrees with candidate key {key}"
                        ));
                    }
                }
                vec![(def.name.clone(), rows)]
            }
        },
        Producer::Completion { spec, part, .. } => {
            let Some(part_def) = pipeline.schema().table(part) else {
                return KeyOutcome::Failed(anyhow!("part table `{part}` is not registered"));
            };
            let ctx = pipeline.resolve_context(&def.name);
            match aggregate::completion_unit(def, part_def, spec, key, &ctx) {
                Ok(None) => return KeyOutcome::Incomplete,
                Ok(Some(unit)) => unit,
                Err(err) => return KeyOutcome::Failed(err.into()),
            }
        }
    };

    let rows: usize = unit.iter().map(|(_, rows)| rows.len()).sum();
    match pipeline.store().insert_unit(unit) {
        Ok(()) => KeyOutcome::Inserted { rows },
        Err(StoreError::DuplicateKey { table, key }) => {
            tracing::debug!(
                table = %table,
                key = %key,
                "insert race lost; key already computed"
            );
            KeyOutcome::RaceLost
        }
        Err(err) => KeyOutcome::Failed(err.into()),
    }
}
