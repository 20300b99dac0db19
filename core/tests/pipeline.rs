use response_core::clustering::Clusterer;
use response_core::config::{ExpectedShapes, PipelineConfig};
use response_core::error::{PipelineError, PipelineResult};
use response_core::event::RawEvent;
use response_core::features::FeatureMatrix;
use response_core::input::{parse_json_lines, RawInputs};
use response_core::pipeline::Pipeline;
use response_core::table::Shape;

// ── Test helpers ────────────────────────────────────────────────────────────

const PORTFOLIO: &str = r#"
{"id": "o-a", "offer_type": "bogo", "difficulty": 10, "duration": 7, "reward": 10, "channels": ["email", "mobile"]}
{"id": "o-b", "offer_type": "informational", "difficulty": 0, "duration": 3, "reward": 0, "channels": ["email"]}
{"id": "o-c", "offer_type": "discount", "difficulty": 7, "duration": 7, "reward": 3, "channels": ["web"]}
"#;

const PROFILE: &str = r#"
{"id": "p1", "gender": "F", "age": 34, "income": 64000, "became_member_on": 20170503}
{"id": "p2", "gender": null, "age": 118, "income": null, "became_member_on": 20180101}
{"id": "p3", "gender": "M", "age": 71, "income": 98000, "became_member_on": 20150920}
"#;

const TRANSCRIPT: &str = r#"
{"person": "p1", "event": "offer received", "value": {"offer id": "o-a"}, "time": 0}
{"person": "p1", "event": "offer received", "value": {"offer id": "o-b"}, "time": 0}
{"person": "p2", "event": "offer received", "value": {"offer id": "o-c"}, "time": 0}
{"person": "p1", "event": "offer viewed", "value": {"offer id": "o-b"}, "time": 1}
{"person": "p1", "event": "offer viewed", "value": {"offer id": "o-a"}, "time": 2}
{"person": "p3", "event": "transaction", "value": {"amount": 4.5}, "time": 3}
{"person": "p2", "event": "transaction", "value": {"amount": 8.0}, "time": 4}
{"person": "p2", "event": "offer completed", "value": {"offer_id": "o-c", "reward": 3}, "time": 4}
{"person": "p1", "event": "transaction", "value": {"amount": 25.0}, "time": 5}
{"person": "p1", "event": "offer completed", "value": {"offer_id": "o-a", "reward": 10}, "time": 5}
"#;

fn raw_inputs() -> RawInputs {
    RawInputs {
        offers:    parse_json_lines(PORTFOLIO.as_bytes(), "portfolio").unwrap(),
        customers: parse_json_lines(PROFILE.as_bytes(), "profile").unwrap(),
        events:    parse_json_lines(TRANSCRIPT.as_bytes(), "transcript").unwrap(),
    }
}

/// Labels rows alternately 0, 1, 0, ...
struct Alternating;

impl Clusterer for Alternating {
    fn name(&self) -> &str {
        "alternating"
    }

    fn fit_predict(&mut self, matrix: &FeatureMatrix) -> PipelineResult<Vec<usize>> {
        Ok((0..matrix.nrows()).map(|i| i % 2).collect())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// All four stages over a small transcript, checking what lands in the store.
#[test]
fn stages_run_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();
    let pipeline = Pipeline::build_test("pipe-e2e".into()).unwrap();

    let cleaned = pipeline.clean(&raw_inputs()).unwrap();
    assert_eq!(cleaned.offers.len(), 3);
    assert_eq!(cleaned.customers.len(), 3);
    assert_eq!(cleaned.events.len(), 10);
    assert_eq!(cleaned.offer_ids.get(&"o-c".to_string()), Some(3));
    assert_eq!(cleaned.customer_ids.get(&"p2".to_string()), Some(2));

    let rows = pipeline.combine().unwrap();
    let ids: Vec<u64> = rows.iter().map(|r| r.customer_id).collect();
    assert_eq!(ids, vec![1, 2], "p3 only transacted and has no row");

    let p1 = &rows[0];
    assert_eq!(p1.bogo.response_sum, 1);
    assert_eq!(p1.bogo.amount_mean, 25.0);
    assert_eq!(p1.bogo.reward_mean, 10.0);
    assert_eq!(p1.discount.response_sum, 0);

    let p2 = &rows[1];
    assert_eq!(p2.discount.response_sum, 0, "completion without a view");
    assert_eq!(p2.discount.difficulty_mean, 7.0);
    assert_eq!(p2.profile.age, 71, "missing age backward-filled from p3");

    let responses = pipeline.store.load_responses("pipe-e2e").unwrap();
    assert_eq!(responses.len(), 3, "one record per (customer, offer) pair");

    let (_, matrix) = pipeline.features().unwrap();
    assert_eq!((matrix.nrows(), matrix.ncols()), (2, 21));

    let report = pipeline.label(&mut Alternating).unwrap();
    assert_eq!(report.clusterer, "alternating");
    assert_eq!(report.rows, 2);
    assert_eq!(report.cluster_sizes.into_iter().collect::<Vec<_>>(), vec![(0, 1), (1, 1)]);

    let labeled = pipeline.store.load_labeled("pipe-e2e").unwrap();
    assert_eq!(labeled.len(), 2);
    assert_eq!(labeled[1].cluster, 1);
    assert_eq!(labeled[0].row, rows[0]);
}

/// A golden shape that does not match stops the stage before anything is stored.
#[test]
fn shape_guard_stops_clean() {
    let mut pipeline = Pipeline::build_test("pipe-shape".into()).unwrap();
    pipeline.config.expected_shapes = ExpectedShapes {
        offers: Some(Shape { rows: 10, cols: 9 }),
        ..ExpectedShapes::default()
    };

    let err = pipeline.clean(&raw_inputs()).unwrap_err();
    assert!(
        matches!(
            err,
            PipelineError::ShapeMismatch { stage: "clean.offers", expected_rows: 10, actual_rows: 3, .. }
        ),
        "got {err}"
    );
    assert_eq!(pipeline.store.row_count("pipe-shape", "offer").unwrap(), 0);
}

#[test]
fn shape_guard_on_aggregate() {
    let mut pipeline = Pipeline::build_test("pipe-agg-shape".into()).unwrap();
    pipeline.clean(&raw_inputs()).unwrap();
    pipeline.config.expected_shapes.aggregated = Some(Shape { rows: 2, cols: 22 });
    assert_eq!(pipeline.combine().unwrap().len(), 2);

    pipeline.config.expected_shapes.aggregated = Some(Shape { rows: 3, cols: 22 });
    assert!(matches!(
        pipeline.features(),
        Err(PipelineError::ShapeMismatch { stage: "features.aggregated", .. })
    ));
}

/// A combine that fails its shape guard stores nothing, so it can be run
/// again once the expectation is fixed.
#[test]
fn combine_reruns_after_failed_shape_guard() {
    let mut pipeline = Pipeline::build_test("pipe-rerun".into()).unwrap();
    pipeline.clean(&raw_inputs()).unwrap();

    pipeline.config.expected_shapes.aggregated = Some(Shape { rows: 5, cols: 22 });
    assert!(matches!(
        pipeline.combine(),
        Err(PipelineError::ShapeMismatch { stage: "combine.aggregated", actual_rows: 2, .. })
    ));
    for table in ["response", "response_agg"] {
        assert_eq!(
            pipeline.store.row_count("pipe-rerun", table).unwrap(),
            0,
            "{table} must stay empty after a failed combine"
        );
    }

    pipeline.config.expected_shapes.aggregated = None;
    let rows = pipeline.combine().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(pipeline.store.row_count("pipe-rerun", "response").unwrap(), 3);
}

/// Running the stages twice over the same run replaces rows instead of
/// failing on duplicate keys, and drops labels fitted on the old aggregate.
#[test]
fn stages_rerun_on_same_run() {
    let pipeline = Pipeline::build_test("pipe-twice".into()).unwrap();
    pipeline.clean(&raw_inputs()).unwrap();
    let first = pipeline.combine().unwrap();
    pipeline.label(&mut Alternating).unwrap();

    pipeline.clean(&raw_inputs()).unwrap();
    assert_eq!(pipeline.store.row_count("pipe-twice", "event").unwrap(), 10);
    assert_eq!(
        pipeline.store.row_count("pipe-twice", "response_labeled").unwrap(),
        0,
        "re-cleaning invalidates downstream tables"
    );

    let second = pipeline.combine().unwrap();
    assert_eq!(first, second);
    pipeline.combine().unwrap();
    assert_eq!(pipeline.store.row_count("pipe-twice", "response_agg").unwrap(), 2);

    pipeline.label(&mut Alternating).unwrap();
    pipeline.label(&mut Alternating).unwrap();
    assert_eq!(pipeline.store.load_labeled("pipe-twice").unwrap().len(), 2);
}

/// Labels far outside the row range come back as a report, not a crash.
#[test]
fn label_accepts_sparse_cluster_ids() {
    struct Sparse;
    impl Clusterer for Sparse {
        fn name(&self) -> &str {
            "sparse"
        }

        fn fit_predict(&mut self, matrix: &FeatureMatrix) -> PipelineResult<Vec<usize>> {
            Ok((0..matrix.nrows()).map(|i| if i == 0 { usize::MAX } else { 7 }).collect())
        }
    }

    let pipeline = Pipeline::build_test("pipe-sparse".into()).unwrap();
    pipeline.clean(&raw_inputs()).unwrap();
    pipeline.combine().unwrap();

    let report = pipeline.label(&mut Sparse).unwrap();
    assert_eq!(report.cluster_sizes.len(), 2);
    assert_eq!(report.cluster_sizes[&usize::MAX], 1);
    let labeled = pipeline.store.load_labeled("pipe-sparse").unwrap();
    assert_eq!(labeled[1].cluster, 7);
}

/// A transcript mentioning a customer the profile table lacks fails the join
/// instead of producing a row with no profile.
#[test]
fn unknown_transcript_customer_fails_join() {
    let pipeline = Pipeline::build_test("pipe-orphan".into()).unwrap();
    let mut raw = raw_inputs();
    raw.events.extend(
        parse_json_lines::<RawEvent, _>(
            r#"{"person": "ghost", "event": "offer received", "value": {"offer id": "o-a"}, "time": 0}"#
                .as_bytes(),
            "transcript",
        )
        .unwrap(),
    );

    pipeline.clean(&raw).unwrap();
    assert!(matches!(
        pipeline.combine(),
        Err(PipelineError::JoinCardinality { join: "response->customer", .. })
    ));
}

/// Empty inputs flow through every stage as empty, well-formed tables.
#[test]
fn empty_inputs_give_empty_outputs() {
    let pipeline = Pipeline::build_test("pipe-empty".into()).unwrap();
    let cleaned = pipeline.clean(&RawInputs::default()).unwrap();
    assert!(cleaned.events.is_empty());

    assert!(pipeline.combine().unwrap().is_empty());
    let (_, matrix) = pipeline.features().unwrap();
    assert_eq!((matrix.nrows(), matrix.ncols()), (0, 21));

    let report = pipeline.label(&mut Alternating).unwrap();
    assert_eq!(report.rows, 0);
    assert_eq!(report.silhouette, 0.0);
}

/// The shipped config parses and carries the reference shapes.
#[test]
fn shipped_config_loads() {
    let config = PipelineConfig::load("../data").unwrap();
    assert_eq!(config.cleaning.missing_age_sentinel, 118);
    assert_eq!(config.bucketing.age.bucket(100.0), "(90, 100]");
    assert_eq!(config.bucketing.income.bucket(110_001.0), "over 110000");

    let reference = ExpectedShapes::reference();
    assert_eq!(config.expected_shapes.aggregated, reference.aggregated);
    assert_eq!(config.expected_shapes.events, reference.events);
}
