//! Completion aggregation: group gating, part-row cascades, empty groups,
//! and snapshot immutability once a group has been emitted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stratum_engine::{
    insert_key, CompletionSpec, EngineError, KeySource, MakeOutput, MemoryStore, Pipeline,
    PipelineBuilder, Store,
};
use stratum_schema::{Key, Row, TableDef};

/// acquisition -> image fan-out, a per-acquisition marker stage, a per-image
/// computed stage, and a completion stage watching the marker.
///
/// The `process_all` gate lets tests hold back the per-image stage for
/// acquisitions other than acq_0, mimicking an upstream table that has only
/// partially caught up.
fn completion_pipeline(process_all: Arc<AtomicBool>) -> Pipeline<MemoryStore> {
    let mut builder = PipelineBuilder::new();
    builder
        .entity(TableDef::entity("acquisition").with_key_attr("acquisition_name"))
        .unwrap();
    builder
        .entity(
            TableDef::entity("image")
                .with_key_attr("acquisition_name")
                .with_key_attr("rnd"),
        )
        .unwrap();
    builder
        .computed(
            TableDef::computed("preprocess_start").with_key_attr("acquisition_name"),
            KeySource::join(["acquisition"]),
            insert_key(),
        )
        .unwrap();
    builder
        .computed(
            TableDef::computed("preprocess")
                .with_key_attr("acquisition_name")
                .with_key_attr("rnd"),
            KeySource::join(["image", "preprocess_start"]),
            move |key: &Key| -> anyhow::Result<MakeOutput> {
                if !process_all.load(Ordering::SeqCst)
                    && key.get("acquisition_name").and_then(|v| v.as_text()) != Some("acq_0")
                {
                    return Ok(MakeOutput::NoResult);
                }
                Ok(MakeOutput::Rows(vec![Row::from_key(key)]))
            },
        )
        .unwrap();
    builder
        .completion(
            TableDef::computed("preprocess_done").with_key_attr("acquisition_name"),
            TableDef::part("preprocess_done_part")
                .with_key_attr("acquisition_name")
                .with_key_attr("rnd"),
            KeySource::join(["preprocess_start"]),
            CompletionSpec::new("image", "preprocess"),
        )
        .unwrap();
    builder
        .reference("image", "acquisition")
        .reference("preprocess_start", "acquisition")
        .reference("preprocess", "image")
        .reference("preprocess", "preprocess_start")
        .reference("preprocess_done", "preprocess_start")
        .reference("preprocess_done_part", "preprocess");
    builder.build(MemoryStore::new()).unwrap()
}

fn seed_two_acquisitions(pipeline: &Pipeline<MemoryStore>) {
    pipeline
        .insert(
            "acquisition",
            vec![
                Row::new().with("acquisition_name", "acq_0"),
                Row::new().with("acquisition_name", "acq_1"),
            ],
        )
        .unwrap();
    pipeline
        .insert(
            "image",
            vec![
                Row::new().with("acquisition_name", "acq_0").with("rnd", 0),
                Row::new().with("acquisition_name", "acq_0").with("rnd", 1),
                Row::new().with("acquisition_name", "acq_1").with("rnd", 0),
                Row::new().with("acquisition_name", "acq_1").with("rnd", 1),
                Row::new().with("acquisition_name", "acq_1").with("rnd", 2),
            ],
        )
        .unwrap();
}

fn part_count(pipeline: &Pipeline<MemoryStore>, acq: &str) -> usize {
    pipeline
        .store()
        .scan("preprocess_done_part")
        .unwrap()
        .restrict(&Key::new().with("acquisition_name", acq))
        .len()
}

#[test]
fn group_completes_only_when_counts_agree() {
    let gate = Arc::new(AtomicBool::new(false));
    let pipeline = completion_pipeline(gate.clone());
    seed_two_acquisitions(&pipeline);

    pipeline.populate("preprocess_start").unwrap();
    // Only acq_0's images get processed this round.
    let partial = pipeline.populate("preprocess").unwrap();
    assert_eq!(partial.inserted_keys, 2);
    assert_eq!(partial.skipped, 3);

    let done = pipeline.populate("preprocess_done").unwrap();
    assert_eq!(done.inserted_keys, 1);
    // acq_1 (expected 3, actual 0) is skipped, not failed.
    assert_eq!(done.skipped, 1);
    assert!(done.is_clean());
    assert_eq!(part_count(&pipeline, "acq_0"), 2);
    assert_eq!(part_count(&pipeline, "acq_1"), 0);

    // Upstream catches up; the skipped group is reconsidered.
    gate.store(true, Ordering::SeqCst);
    pipeline.populate("preprocess").unwrap();
    let done = pipeline.populate("preprocess_done").unwrap();
    assert_eq!(done.inserted_keys, 1);
    assert_eq!(part_count(&pipeline, "acq_1"), 3);
    assert_eq!(pipeline.store().row_count("preprocess_done").unwrap(), 2);
}

#[test]
fn part_rows_equal_expected_at_emission() {
    let pipeline = completion_pipeline(Arc::new(AtomicBool::new(true)));
    seed_two_acquisitions(&pipeline);
    pipeline.populate_all().unwrap();

    assert_eq!(part_count(&pipeline, "acq_0"), 2);
    assert_eq!(part_count(&pipeline, "acq_1"), 3);

    // Part keys extend the group key with the constituent's attribute.
    let pk = vec!["acquisition_name".to_string(), "rnd".to_string()];
    let keys = pipeline
        .store()
        .scan("preprocess_done_part")
        .unwrap()
        .keys(&pk);
    assert_eq!(keys.len(), 5);
    assert_eq!(
        keys[0],
        Key::new().with("acquisition_name", "acq_0").with("rnd", 0)
    );
}

#[test]
fn empty_group_is_trivially_complete() {
    let pipeline = completion_pipeline(Arc::new(AtomicBool::new(true)));
    pipeline
        .insert(
            "acquisition",
            vec![Row::new().with("acquisition_name", "acq_empty")],
        )
        .unwrap();

    pipeline.populate("preprocess_start").unwrap();
    pipeline.populate("preprocess").unwrap();
    let done = pipeline.populate("preprocess_done").unwrap();

    // expected == actual == 0: immediate completion, zero part rows.
    assert_eq!(done.inserted_keys, 1);
    assert!(pipeline
        .store()
        .exists(
            "preprocess_done",
            &Key::new().with("acquisition_name", "acq_empty")
        )
        .unwrap());
    assert_eq!(part_count(&pipeline, "acq_empty"), 0);
}

#[test]
fn emitted_groups_are_immutable_snapshots() {
    let pipeline = completion_pipeline(Arc::new(AtomicBool::new(true)));
    pipeline
        .insert(
            "acquisition",
            vec![Row::new().with("acquisition_name", "acq_0")],
        )
        .unwrap();
    pipeline
        .insert(
            "image",
            vec![
                Row::new().with("acquisition_name", "acq_0").with("rnd", 0),
                Row::new().with("acquisition_name", "acq_0").with("rnd", 1),
            ],
        )
        .unwrap();
    pipeline.populate_all().unwrap();
    assert_eq!(part_count(&pipeline, "acq_0"), 2);

    // The group grows after emission: the completion row and its part rows
    // do not change, even though the new image gets processed.
    pipeline
        .insert(
            "image",
            vec![Row::new().with("acquisition_name", "acq_0").with("rnd", 9)],
        )
        .unwrap();
    let preprocess = pipeline.populate("preprocess").unwrap();
    assert_eq!(preprocess.inserted_keys, 1);
    let done = pipeline.populate("preprocess_done").unwrap();
    assert_eq!(done.inserted_keys, 0);
    assert_eq!(part_count(&pipeline, "acq_0"), 2);
    assert_eq!(pipeline.store().row_count("preprocess_done").unwrap(), 1);
}

#[test]
fn part_tables_cannot_be_populated_or_inserted() {
    let pipeline = completion_pipeline(Arc::new(AtomicBool::new(true)));
    assert!(matches!(
        pipeline.populate("preprocess_done_part"),
        Err(EngineError::NotComputed(name)) if name == "preprocess_done_part"
    ));
    assert!(matches!(
        pipeline.insert("preprocess_done_part", vec![Row::new()]),
        Err(EngineError::NotEntity(_))
    ));
}

#[test]
fn part_attr_missing_from_actual_source_is_a_per_key_failure() {
    let mut builder = PipelineBuilder::new();
    builder
        .entity(TableDef::entity("acquisition").with_key_attr("acquisition_name"))
        .unwrap();
    builder
        .entity(
            TableDef::entity("image")
                .with_key_attr("acquisition_name")
                .with_key_attr("rnd"),
        )
        .unwrap();
    builder
        .completion(
            TableDef::computed("done").with_key_attr("acquisition_name"),
            // `ghost` extends the parent key but the actual source has no
            // such attribute to fill it from.
            TableDef::part("done_part")
                .with_key_attr("acquisition_name")
                .with_key_attr("ghost"),
            KeySource::join(["acquisition"]),
            CompletionSpec::new("image", "image"),
        )
        .unwrap();
    builder.reference("image", "acquisition");
    let pipeline = builder.build(MemoryStore::new()).unwrap();
    pipeline
        .insert(
            "acquisition",
            vec![Row::new().with("acquisition_name", "acq_0")],
        )
        .unwrap();
    pipeline
        .insert(
            "image",
            vec![Row::new().with("acquisition_name", "acq_0").with("rnd", 0)],
        )
        .unwrap();

    let report = pipeline.populate("done").unwrap();
    assert_eq!(report.inserted_keys, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("ghost"));
}

#[test]
fn part_primary_key_must_extend_the_parent_key() {
    let mut builder = PipelineBuilder::new();
    builder
        .entity(TableDef::entity("acquisition").with_key_attr("acquisition_name"))
        .unwrap();
    builder
        .entity(
            TableDef::entity("image")
                .with_key_attr("acquisition_name")
                .with_key_attr("rnd"),
        )
        .unwrap();
    builder
        .completion(
            TableDef::computed("done").with_key_attr("acquisition_name"),
            // Parent key attribute demoted to a secondary: structurally
            // linked, but not a key extension.
            TableDef::part("done_part")
                .with_key_attr("rnd")
                .with_attr("acquisition_name"),
            KeySource::join(["acquisition"]),
            CompletionSpec::new("image", "image"),
        )
        .unwrap();
    builder.reference("image", "acquisition");
    let err = builder.build(MemoryStore::new()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::PartKey { table, attr }
            if table == "done_part" && attr == "acquisition_name"
    ));
}
