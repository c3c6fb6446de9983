//! The compute-callback seam.
//!
//! A computed table binds a [`Make`] implementation; the populate executor
//! calls it once per remaining key and inserts whatever comes back as one
//! atomic unit. The callback is a black box to the engine (it may run image
//! processing, signal analysis, or nothing at all) and reports domain
//! failures through `anyhow` so arbitrary error types compose.

use anyhow::Result;

use stratum_schema::{Key, Row};

/// What a callback produced for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MakeOutput {
    /// Full rows (primary key + secondary attributes) to insert. Every row
    /// must agree with the candidate key on the key's attributes. An empty
    /// vector is equivalent to [`MakeOutput::NoResult`].
    Rows(Vec<Row>),
    /// Nothing to produce for this key. A per-key no-op, not an error; the
    /// key stays in the key source and is offered again on the next run.
    NoResult,
}

pub trait Make: Send + Sync {
    fn make(&self, key: &Key) -> Result<MakeOutput>;
}

impl<F> Make for F
where
    F: Fn(&Key) -> Result<MakeOutput> + Send + Sync,
{
    fn make(&self, key: &Key) -> Result<MakeOutput> {
        self(key)
    }
}

/// The identity callback: insert exactly the candidate key. The common case
/// for marker tables whose rows carry no secondary attributes.
pub fn insert_key() -> impl Make {
    |key: &Key| -> Result<MakeOutput> { Ok(MakeOutput::Rows(vec![Row::from_key(key)])) }
}
