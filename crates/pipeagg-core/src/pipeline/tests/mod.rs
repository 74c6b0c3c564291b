#![allow(clippy::float_cmp)]


use crate::{
    error::{ConfigError, ErrorClass, ErrorOrigin},
    gap::GapPolicy,
    model::{AggregationResult, Aggregations, Bucket, BucketKey, MultiBucket, SingleValue},
    obs::{MetricsEvent, MetricsSink, StageSummary, with_metrics_sink},
    path::BucketsPath,
    pipeline::{BucketScriptAggregator, BucketScriptConfig, CancelToken, ExecutionConfig},
    script::{
        CompiledScript, EvaluationError, Params, ScriptCatalog, ScriptOutput, ScriptSpec,
        script_fn,
    },
    test_support::{
        EmptySums, HISTO, SUM_FIELDS, fixture_docs, histogram, metric, mock_catalog, output,
    },
};
use std::{
    cell::RefCell,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

const OUTPUT: &str = "seriesArithmetic";

fn aggregator(source: &str, paths: BucketsPath, policy: GapPolicy) -> BucketScriptAggregator {
    let script = mock_catalog()
        .compile(&ScriptSpec::inline(source))
        .expect("mock script should compile");

    BucketScriptAggregator::new(OUTPUT, paths, script, policy)
        .expect("aggregator should build")
        .with_execution(ExecutionConfig::sequential())
}

fn sum_paths() -> BucketsPath {
    BucketsPath::positional(SUM_FIELDS).expect("sum paths should build")
}

fn fixture(empty: EmptySums) -> MultiBucket {
    histogram(&fixture_docs(), 10, empty)
}

fn keys(buckets: &MultiBucket) -> Vec<(BucketKey, u64)> {
    buckets
        .buckets()
        .iter()
        .map(|b| (b.key().clone(), b.doc_count()))
        .collect()
}

///
/// RecordingSink
///

#[derive(Default)]
struct RecordingSink {
    finished: RefCell<Vec<StageSummary>>,
    failed: RefCell<Vec<ErrorClass>>,
    started: RefCell<u32>,
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::StageStart { output } => {
                assert_eq!(output, OUTPUT);
                *self.started.borrow_mut() += 1;
            }
            MetricsEvent::StageFinish { summary, .. } => self.finished.borrow_mut().push(summary),
            MetricsEvent::StageFailed { class, .. } => self.failed.borrow_mut().push(class),
        }
    }
}

//
// Derived values
//

#[test]
fn inline_script_sums_siblings_and_omits_empty_buckets() {
    let input = fixture(EmptySums::Zero);
    let reduced = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip)
        .reduce(input.clone())
        .expect("reduce should succeed");

    assert_eq!(keys(&reduced), keys(&input));
    for bucket in reduced.buckets() {
        if bucket.doc_count() == 0 {
            assert_eq!(output(bucket, OUTPUT), None);
        } else {
            let expected = metric(bucket, "field2Sum")
                + metric(bucket, "field3Sum")
                + metric(bucket, "field4Sum");
            assert_eq!(output(bucket, OUTPUT), Some(SingleValue::new(expected)));
        }
    }
}

#[test]
fn inline_script_follows_operator_precedence_of_the_expression() {
    let reduced = aggregator("_value0 + _value1 / _value2", sum_paths(), GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect("reduce should succeed");

    for bucket in reduced.buckets().iter().filter(|b| b.doc_count() > 0) {
        let expected = metric(bucket, "field2Sum")
            + metric(bucket, "field3Sum") / metric(bucket, "field4Sum");
        let value = output(bucket, OUTPUT).and_then(|v| v.value());
        match value {
            Some(v) if expected.is_nan() => assert!(v.is_nan()),
            other => assert_eq!(other, Some(expected)),
        }
    }
}

#[test]
fn single_variable_script_copies_the_sibling_value() {
    let paths = BucketsPath::positional(["field2Sum"]).expect("paths");
    let reduced = aggregator("_value0", paths, GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect("reduce should succeed");

    for bucket in reduced.buckets() {
        if bucket.doc_count() == 0 {
            assert!(!bucket.aggregations().contains_key(OUTPUT));
        } else {
            assert_eq!(
                output(bucket, OUTPUT),
                Some(SingleValue::new(metric(bucket, "field2Sum")))
            );
        }
    }
}

#[test]
fn named_bindings_match_positional_bindings() {
    let named = BucketsPath::named([
        ("foo", "field2Sum"),
        ("bar", "field3Sum"),
        ("baz", "field4Sum"),
    ])
    .expect("named paths");

    let by_name = aggregator("foo + bar + baz", named, GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect("named reduce should succeed");
    let by_position = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect("positional reduce should succeed");

    assert_eq!(by_name, by_position);
}

#[test]
fn static_params_participate_in_the_expression() {
    let script = mock_catalog()
        .compile(
            &ScriptSpec::inline("(_value0 + _value1 + _value2) * factor")
                .with_params(Params::new().with("factor", 3_i64)),
        )
        .expect("script should compile");
    let reduced = BucketScriptAggregator::new(OUTPUT, sum_paths(), script, GapPolicy::Skip)
        .expect("aggregator")
        .reduce(fixture(EmptySums::Zero))
        .expect("reduce should succeed");

    for bucket in reduced.buckets().iter().filter(|b| b.doc_count() > 0) {
        let expected = (metric(bucket, "field2Sum")
            + metric(bucket, "field3Sum")
            + metric(bucket, "field4Sum"))
            * 3.0;
        assert_eq!(output(bucket, OUTPUT), Some(SingleValue::new(expected)));
    }
}

#[test]
fn insert_zeros_evaluates_empty_buckets_over_zero_inputs() {
    for empty in [EmptySums::Zero, EmptySums::Unset] {
        let reduced = aggregator(
            "_value0 + _value1 + _value2",
            sum_paths(),
            GapPolicy::InsertZeros,
        )
        .reduce(fixture(empty))
        .expect("reduce should succeed");

        for bucket in reduced.buckets() {
            let value = output(bucket, OUTPUT).expect("every bucket gets a value");
            if bucket.doc_count() == 0 {
                assert_eq!(value.value(), Some(0.0));
            }
        }
    }
}

#[test]
fn skip_omits_buckets_with_an_unset_metric_despite_documents() {
    let input = MultiBucket::new(vec![
        Bucket::new(0.0, 4)
            .with_aggregation("field2Sum", SingleValue::new(2.0))
            .with_aggregation("field3Sum", SingleValue::empty())
            .with_aggregation("field4Sum", SingleValue::new(1.0)),
        Bucket::new(10.0, 2)
            .with_aggregation("field2Sum", SingleValue::new(2.0))
            .with_aggregation("field3Sum", SingleValue::new(f64::NAN))
            .with_aggregation("field4Sum", SingleValue::new(1.0)),
    ]);

    let skipped = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip)
        .reduce(input.clone())
        .expect("reduce should succeed");
    let filled = aggregator(
        "_value0 + _value1 + _value2",
        sum_paths(),
        GapPolicy::InsertZeros,
    )
    .reduce(input)
    .expect("reduce should succeed");

    assert!(skipped.buckets().iter().all(|b| output(b, OUTPUT).is_none()));
    assert!(
        filled
            .buckets()
            .iter()
            .all(|b| output(b, OUTPUT) == Some(SingleValue::new(3.0)))
    );
}

#[test]
fn stored_script_resolves_through_the_catalog() {
    let config = BucketScriptConfig::new(OUTPUT, sum_paths(), ScriptSpec::stored("my_script"));
    let stored = BucketScriptAggregator::from_config(&config, &mock_catalog())
        .expect("stored script should resolve")
        .reduce(fixture(EmptySums::Zero))
        .expect("reduce should succeed");
    let inline = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect("reduce should succeed");

    assert_eq!(stored, inline);
}

#[test]
fn count_and_key_paths_feed_the_script() {
    let paths = BucketsPath::positional(["field2Sum", "_count", "_key"]).expect("paths");
    let reduced = aggregator("_value0 + _value1 + _value2", paths, GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect("reduce should succeed");

    for bucket in reduced.buckets().iter().filter(|b| b.doc_count() > 0) {
        let key = bucket.key().as_number().expect("histogram keys are numeric");
        #[allow(clippy::cast_precision_loss)]
        let expected = metric(bucket, "field2Sum") + bucket.doc_count() as f64 + key;
        assert_eq!(output(bucket, OUTPUT), Some(SingleValue::new(expected)));
    }
}

#[test]
fn evaluator_no_value_attaches_an_empty_metric() {
    let paths = BucketsPath::positional(["field2Sum"]).expect("paths");
    let reduced = aggregator("_value0 < 0 ? null : _value0", paths, GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect("reduce should succeed");

    for bucket in reduced.buckets() {
        let sum = metric(bucket, "field2Sum");
        match (bucket.doc_count(), output(bucket, OUTPUT)) {
            (0, attached) => assert_eq!(attached, None),
            (_, Some(attached)) if sum < 0.0 => assert_eq!(attached, SingleValue::empty()),
            (_, attached) => assert_eq!(attached, Some(SingleValue::new(sum))),
        }
    }
}

//
// Collection shape
//

#[test]
fn empty_parent_yields_empty_output_without_evaluating() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let script = CompiledScript::new(
        "counting",
        script_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptOutput::Number(1.0))
        }),
    );
    let aggregator = BucketScriptAggregator::new(OUTPUT, sum_paths(), script, GapPolicy::Skip)
        .expect("aggregator");

    let reduced = aggregator
        .reduce(MultiBucket::default())
        .expect("empty parent should reduce");

    assert!(reduced.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn evaluator_runs_exactly_once_per_non_skipped_bucket() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let script = CompiledScript::new(
        "counting",
        script_fn(move |env| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptOutput::Number(env.number("_value0")?))
        }),
    );
    let input = fixture(EmptySums::Zero);
    let non_empty = input.buckets().iter().filter(|b| b.doc_count() > 0).count();

    BucketScriptAggregator::new(OUTPUT, sum_paths(), script, GapPolicy::Skip)
        .expect("aggregator")
        .reduce(input)
        .expect("reduce should succeed");

    assert_eq!(calls.load(Ordering::SeqCst), non_empty);
}

#[test]
fn parallel_execution_matches_sequential_execution() {
    let docs: Vec<_> = (0..400_i64)
        .map(|i| {
            crate::test_support::Doc::new((i * 37) % 1000, i % 13 - 6, (i * 7) % 11, -(i % 5))
        })
        .collect();
    let input = histogram(&docs, 3, EmptySums::Unset);

    let sequential = aggregator(
        "_value0 + _value1 + _value2",
        sum_paths(),
        GapPolicy::InsertZeros,
    )
    .reduce(input.clone())
    .expect("sequential reduce");
    let parallel = aggregator(
        "_value0 + _value1 + _value2",
        sum_paths(),
        GapPolicy::InsertZeros,
    )
    .with_execution(ExecutionConfig::new().with_parallel_threshold(2))
    .reduce(input)
    .expect("parallel reduce");

    assert_eq!(parallel, sequential);
}

#[test]
fn rerunning_the_stage_on_the_same_input_is_deterministic() {
    let agg = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip);

    let first = agg.reduce(fixture(EmptySums::Zero)).expect("first run");
    let second = agg.reduce(fixture(EmptySums::Zero)).expect("second run");

    assert_eq!(first, second);
}

#[test]
fn stages_with_distinct_outputs_compose_without_interference() {
    let first = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip);
    let script = mock_catalog()
        .compile(&ScriptSpec::inline("_value0"))
        .expect("script");
    let second = BucketScriptAggregator::new(
        "copy",
        BucketsPath::positional(["field2Sum"]).expect("paths"),
        script,
        GapPolicy::Skip,
    )
    .expect("aggregator");

    let once = first.reduce(fixture(EmptySums::Zero)).expect("first stage");
    let both = second.reduce(once.clone()).expect("second stage");

    for (before, after) in once.buckets().iter().zip(both.buckets()) {
        assert_eq!(output(before, OUTPUT), output(after, OUTPUT));
    }
}

//
// Failures
//

#[test]
fn unknown_sibling_path_aborts_regardless_of_gap_policy() {
    let paths = BucketsPath::positional(["field2Sum", "field9Sum"]).expect("paths");

    for policy in [GapPolicy::Skip, GapPolicy::InsertZeros] {
        let agg = aggregator("_value0 + _value1 + _value2", paths.clone(), policy);
        let mut parent = fixture(EmptySums::Zero);
        let before = parent.clone();

        let err = agg
            .reduce_in_place(&mut parent)
            .expect_err("unknown path must abort the stage");

        assert!(err.is_config());
        assert_eq!(err.origin, ErrorOrigin::Resolver);
        assert!(matches!(
            err.config_detail(),
            Some(ConfigError::UnknownPath { path, .. }) if path == "field9Sum"
        ));
        assert_eq!(parent, before, "no partial results may leak");
    }
}

#[test]
fn evaluation_failure_aborts_without_partial_results() {
    let paths = BucketsPath::positional(["field3Sum"]).expect("paths");
    let agg = aggregator("sqrt(_value0)", paths, GapPolicy::Skip);
    let mut parent = fixture(EmptySums::Zero);
    let before = parent.clone();

    let err = agg
        .reduce_in_place(&mut parent)
        .expect_err("negative sqrt input must abort");

    assert!(err.is_evaluation());
    assert!(matches!(
        err.evaluation_detail(),
        Some(EvaluationError::Failed { .. })
    ));
    assert_eq!(parent, before);
}

#[test]
fn undefined_script_variable_is_an_evaluation_error() {
    let paths = BucketsPath::named([("foo", "field2Sum")]).expect("paths");
    let err = aggregator("foo + bar + baz", paths, GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect_err("unbound variable must abort");

    assert_eq!(
        err.evaluation_detail(),
        Some(&EvaluationError::UndefinedVariable {
            name: "bar".to_string()
        })
    );
}

#[test]
fn output_name_collision_is_a_configuration_error() {
    let agg = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip);
    let once = agg.reduce(fixture(EmptySums::Zero)).expect("first run");

    let err = agg.reduce(once).expect_err("second run must collide");

    assert!(matches!(
        err.config_detail(),
        Some(ConfigError::OutputNameCollision { name, .. }) if name == OUTPUT
    ));
}

#[test]
fn unknown_script_fails_before_any_bucket_is_visited() {
    let config = BucketScriptConfig::new(OUTPUT, sum_paths(), ScriptSpec::inline("nope"));
    let err = BucketScriptAggregator::from_config(&config, &ScriptCatalog::new())
        .expect_err("unknown script must fail");

    assert_eq!(err.origin, ErrorOrigin::Script);
    assert!(err.is_config());
}

#[test]
fn empty_output_name_is_rejected() {
    let script = mock_catalog()
        .compile(&ScriptSpec::inline("_value0"))
        .expect("script");
    let err = BucketScriptAggregator::new("", sum_paths(), script, GapPolicy::Skip)
        .expect_err("empty output name must fail");

    assert_eq!(err.config_detail(), Some(&ConfigError::EmptyOutputName));
}

#[test]
fn cancelled_token_aborts_the_stage() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let agg = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip)
        .with_cancel_token(cancel.clone());

    let err = agg
        .reduce(fixture(EmptySums::Zero))
        .expect_err("cancelled stage must abort");

    assert!(cancel.is_cancelled());
    assert_eq!(err.class, ErrorClass::Cancelled);
}

//
// Named tree entry point
//

#[test]
fn reduce_named_augments_the_named_parent_only() {
    let mut aggs: Aggregations = [
        (
            HISTO,
            AggregationResult::from(histogram(&fixture_docs(), 10, EmptySums::Zero)),
        ),
        ("total", AggregationResult::from(SingleValue::new(9.0))),
    ]
    .into_iter()
    .collect();
    let agg = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip);

    agg.reduce_named(&mut aggs, HISTO).expect("named reduce");

    let histo = aggs
        .get(HISTO)
        .and_then(|result| result.as_multi_bucket())
        .expect("histo stays multi-bucket");
    assert!(
        histo
            .buckets()
            .iter()
            .filter(|b| b.doc_count() > 0)
            .all(|b| output(b, OUTPUT).is_some())
    );
    assert_eq!(aggs.single_value("total").map(SingleValue::value), Ok(Some(9.0)));
}

#[test]
fn reduce_named_rejects_missing_and_single_value_parents() {
    let mut aggs: Aggregations = [("total", SingleValue::new(9.0))].into_iter().collect();
    let agg = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip);

    let missing = agg
        .reduce_named(&mut aggs, HISTO)
        .expect_err("missing parent");
    let wrong = agg
        .reduce_named(&mut aggs, "total")
        .expect_err("single-value parent");

    assert!(matches!(
        missing.config_detail(),
        Some(ConfigError::ParentNotFound { .. })
    ));
    assert!(matches!(
        wrong.config_detail(),
        Some(ConfigError::ParentNotMultiBucket { .. })
    ));
}

//
// Config and observability
//

#[test]
fn config_document_builds_an_equivalent_aggregator() {
    let config: BucketScriptConfig = serde_json::from_str(
        r#"{
            "name": "seriesArithmetic",
            "buckets_path": {"foo": "field2Sum", "bar": "field3Sum", "baz": "field4Sum"},
            "script": {"source": "foo + bar + baz"},
            "gap_policy": "insert_zeros"
        }"#,
    )
    .expect("config should deserialize");

    let agg = BucketScriptAggregator::from_config(&config, &mock_catalog())
        .expect("aggregator should build")
        .with_execution(ExecutionConfig::sequential());
    let reduced = agg
        .reduce(fixture(EmptySums::Unset))
        .expect("reduce should succeed");

    assert_eq!(agg.gap_policy(), GapPolicy::InsertZeros);
    assert!(reduced.buckets().iter().all(|b| output(b, OUTPUT).is_some()));
}

#[test]
fn config_gap_policy_defaults_to_skip() {
    let config: BucketScriptConfig = serde_json::from_str(
        r#"{"name": "x", "buckets_path": ["a"], "script": {"id": "my_script"}}"#,
    )
    .expect("config should deserialize");

    assert_eq!(config.gap_policy(), GapPolicy::Skip);
}

#[test]
fn stage_reports_bucket_summary_to_the_metrics_sink() {
    let sink = RecordingSink::default();
    let agg = aggregator(
        "_value0 + _value1 + _value2",
        sum_paths(),
        GapPolicy::InsertZeros,
    );

    with_metrics_sink(&sink, || {
        agg.reduce(fixture(EmptySums::Unset)).expect("reduce");
    });

    assert_eq!(*sink.started.borrow(), 1);
    assert_eq!(
        sink.finished.borrow().as_slice(),
        &[StageSummary {
            buckets: 6,
            evaluated: 6,
            skipped: 0,
            no_value: 0,
            gaps_filled: 6,
            parallel: false,
        }]
    );
    assert!(sink.failed.borrow().is_empty());
}

#[test]
fn stage_reports_failures_by_class() {
    let sink = RecordingSink::default();
    let paths = BucketsPath::positional(["missing"]).expect("paths");
    let agg = aggregator("_value0", paths, GapPolicy::Skip);

    with_metrics_sink(&sink, || {
        agg.reduce(fixture(EmptySums::Zero))
            .expect_err("missing path must fail");
    });

    assert_eq!(sink.failed.borrow().as_slice(), &[ErrorClass::Configuration]);
    assert!(sink.finished.borrow().is_empty());
}

fn named_sum_stage(name: &str) -> BucketScriptAggregator {
    let script = mock_catalog()
        .compile(&ScriptSpec::inline("_value0 + _value1 + _value2"))
        .expect("mock script should compile");

    BucketScriptAggregator::new(name, sum_paths(), script, GapPolicy::Skip)
        .expect("aggregator should build")
}

fn output_summary(name: &str) -> Option<crate::obs::OutputSummary> {
    crate::obs::metrics_report(None)
        .output_counters
        .into_iter()
        .find(|summary| summary.name == name)
}

#[test]
fn global_metrics_accumulate_per_output() {
    let _guard = crate::obs::metrics::test_guard();
    crate::obs::metrics_reset_all();

    named_sum_stage("globalTotals")
        .reduce(fixture(EmptySums::Zero))
        .expect("reduce");

    let summary = output_summary("globalTotals").expect("output counters present");
    assert_eq!(summary.stage_calls, 1);
    assert_eq!(summary.buckets_seen, 6);
    assert_eq!(summary.buckets_evaluated, 4);
    assert_eq!(summary.buckets_skipped, 2);
    assert_eq!(summary.failures, 0);
}

#[test]
fn stages_run_on_other_threads_reach_the_global_report() {
    let _guard = crate::obs::metrics::test_guard();
    crate::obs::metrics_reset_all();

    std::thread::spawn(|| {
        named_sum_stage("workerTotals")
            .reduce(fixture(EmptySums::Zero))
            .expect("reduce on worker thread");
    })
    .join()
    .expect("worker thread should finish");

    let summary = output_summary("workerTotals").expect("worker output counters present");
    assert_eq!(summary.stage_calls, 1);
    assert_eq!(summary.buckets_seen, 6);
}

#[test]
fn trace_messages_are_built_only_when_debugging() {
    let built = AtomicUsize::new(0);
    let message = || {
        built.fetch_add(1, Ordering::SeqCst);
        "stage transition".to_string()
    };

    let quiet = aggregator("_value0", sum_paths(), GapPolicy::Skip);
    quiet.trace(message);
    assert_eq!(built.load(Ordering::SeqCst), 0);

    quiet.debug().trace(message);
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn debug_tracing_does_not_change_results() {
    let plain = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip)
        .reduce(fixture(EmptySums::Zero))
        .expect("plain");
    let traced = aggregator("_value0 + _value1 + _value2", sum_paths(), GapPolicy::Skip)
        .debug()
        .reduce(fixture(EmptySums::Zero))
        .expect("traced");

    assert_eq!(plain, traced);
}

#[test]
fn text_keyed_parents_are_supported_for_metric_paths() {
    let input = MultiBucket::new(vec![
        Bucket::new("eu", 3).with_aggregation("field2Sum", SingleValue::new(4.0)),
        Bucket::new("us", 0).with_aggregation("field2Sum", SingleValue::new(0.0)),
    ]);
    let paths = BucketsPath::positional(["field2Sum"]).expect("paths");

    let reduced = aggregator("_value0", paths, GapPolicy::Skip)
        .reduce(input)
        .expect("reduce");

    assert_eq!(
        output(&reduced.buckets()[0], OUTPUT),
        Some(SingleValue::new(4.0))
    );
    assert_eq!(output(&reduced.buckets()[1], OUTPUT), None);
}
