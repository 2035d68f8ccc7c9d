//! Threshold aggregation over whole runs, and the report artifacts built on
//! top of it.

use chrono::{TimeZone, Utc};
use evalops_core::reporting::SCHEMA_VERSION;
use evalops_core::{
    aggregate, read_summary_json, render_report_md, write_report_artifacts, ConfigError,
    EvaluationResult, FailureKind, RunArtifact, SuiteReport, Threshold, Thresholds,
};
use example_store::ExampleId;
use uuid::Uuid;

fn result(example: usize, metric: &str, score: f64, threshold: Threshold) -> EvaluationResult {
    EvaluationResult {
        example_id: ExampleId::from(format!("{example:064x}")),
        metric: metric.to_string(),
        score,
        passed: threshold.is_met(score),
        reason: format!("{metric} scored {score}"),
        failure: None,
    }
}

fn scores(metric: &str, values: &[f64], threshold: Threshold) -> Vec<EvaluationResult> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| result(i, metric, *v, threshold))
        .collect()
}

// ---- thresholds ----

#[test]
fn mean_exactly_at_threshold_passes() {
    let t = Threshold::at_least(0.8);
    let report = aggregate(
        &scores("trajectory", &[0.8, 0.8], t),
        &Thresholds::new().with("trajectory", t),
    )
    .unwrap();

    let m = report.metric("trajectory").unwrap();
    assert!(m.passed);
    assert!(report.overall_passed);
}

#[test]
fn one_low_example_does_not_sink_a_high_mean() {
    let t = Threshold::at_least(0.8);
    let report = aggregate(
        &scores("tool_args", &[1.0, 1.0, 1.0, 1.0, 0.5], t),
        &Thresholds::new().with("tool_args", t),
    )
    .unwrap();

    let m = report.metric("tool_args").unwrap();
    assert!((m.mean_score - 0.9).abs() < 1e-9);
    assert_eq!(m.pass_count, 4);
    assert_eq!(m.total_count, 5);
    assert_eq!(m.min_score, 0.5);
    assert!(m.passed);
}

#[test]
fn any_failing_metric_fails_the_run() {
    let traj = Threshold::at_least(0.8);
    let rel = Threshold::at_least(0.9);
    let mut results = scores("trajectory", &[1.0, 1.0, 1.0], traj);
    results.extend(scores("relevance", &[1.0, 0.0, 1.0], rel));

    let report = aggregate(
        &results,
        &Thresholds::new().with("trajectory", traj).with("relevance", rel),
    )
    .unwrap();

    assert!(!report.overall_passed);
    let failed: Vec<&str> = report.failed_metrics().map(|m| m.metric.as_str()).collect();
    assert_eq!(failed, vec!["relevance"]);
    assert_eq!(report.examples_evaluated, 3);
}

#[test]
fn failure_results_count_as_zero() {
    let t = Threshold::at_least(0.5);
    let mut results = scores("correctness", &[1.0], t);
    results.push(EvaluationResult::failed(
        ExampleId::from("f".repeat(64)),
        "correctness",
        FailureKind::Invocation,
        "agent runtime returned HTTP 500",
    ));

    let report = aggregate(&results, &Thresholds::new().with("correctness", t)).unwrap();
    let m = report.metric("correctness").unwrap();
    assert_eq!(m.mean_score, 0.5);
    assert_eq!(m.failure_count, 1);
    assert!(m.passed);
}

#[test]
fn failures_never_pass_a_lower_is_better_metric() {
    let t = Threshold::parse("<=0.2").unwrap();
    let results: Vec<_> = (0..3)
        .map(|i| {
            EvaluationResult::failed(
                ExampleId::from(format!("{i:064x}")),
                "hallucination_rate",
                FailureKind::Invocation,
                "agent invocation timed out",
            )
        })
        .collect();

    let report = aggregate(&results, &Thresholds::new().with("hallucination_rate", t)).unwrap();
    let m = report.metric("hallucination_rate").unwrap();
    assert_eq!(m.mean_score, 0.0);
    assert_eq!(m.failure_count, 3);
    assert!(!m.passed);
    assert!(!report.overall_passed);
}

#[test]
fn one_failure_fails_an_upper_bound_metric_despite_low_mean() {
    let t = Threshold::parse("<0.5").unwrap();
    let mut results = scores("hallucination_rate", &[0.1, 0.2], t);
    results.push(EvaluationResult::failed(
        ExampleId::from("e".repeat(64)),
        "hallucination_rate",
        FailureKind::JudgeParse,
        "judge output had no score",
    ));

    let report = aggregate(&results, &Thresholds::new().with("hallucination_rate", t)).unwrap();
    assert!(!report.metric("hallucination_rate").unwrap().passed);

    let clean = scores("hallucination_rate", &[0.1, 0.2], t);
    let report = aggregate(&clean, &Thresholds::new().with("hallucination_rate", t)).unwrap();
    assert!(report.metric("hallucination_rate").unwrap().passed);
}

#[test]
fn configured_metric_without_results_fails() {
    let t = Threshold::at_least(0.8);
    let report = aggregate(
        &scores("trajectory", &[1.0], t),
        &Thresholds::new().with("trajectory", t).with("relevance", t),
    )
    .unwrap();

    assert!(!report.metric("relevance").unwrap().passed);
    assert!(!report.overall_passed);
}

#[test]
fn result_for_unknown_metric_is_a_config_error() {
    let t = Threshold::at_least(0.8);
    let err = aggregate(&scores("latency", &[1.0], t), &Thresholds::new().with("trajectory", t))
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnconfiguredMetric { ref metric } if metric == "latency"));
}

#[test]
fn threshold_expressions_from_config_strings() {
    let t = Threshold::parse(">=3.5").unwrap();
    let report = aggregate(
        &scores("tool_args_quality", &[3.0, 4.0, 4.0], t),
        &Thresholds::new().with("tool_args_quality", t),
    )
    .unwrap();
    let m = report.metric("tool_args_quality").unwrap();
    assert!(m.passed);
    assert_eq!(m.pass_count, 2);
}

// ---- artifacts ----

fn run(suite: &str, results: Vec<EvaluationResult>, thresholds: Thresholds) -> RunArtifact {
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 6, 0, 0).unwrap();
    RunArtifact {
        schema_version: SCHEMA_VERSION.to_string(),
        run_id: Uuid::nil(),
        suite: suite.to_string(),
        agent: format!("{suite}-agent"),
        dataset: suite.to_string(),
        generation_tag: "daily-2026-03-14".into(),
        started_at: at,
        finished_at: at,
        cancelled: false,
        thresholds,
        results,
    }
}

#[test]
fn report_regenerates_identically_from_results_files() {
    let dir = tempfile::tempdir().unwrap();
    let t = Threshold::at_least(0.8);
    let artifact = run(
        "market",
        scores("trajectory", &[1.0, 0.5, 1.0], t),
        Thresholds::new().with("trajectory", t),
    );
    let path = dir.path().join("market.results.json");
    evalops_core::write_run_json(&path, &artifact).unwrap();

    let reloaded = evalops_core::read_run_json(&path).unwrap();
    assert_eq!(reloaded, artifact);

    let a = render_report_md(&[SuiteReport::from_run(&artifact).unwrap()]);
    let b = render_report_md(&[SuiteReport::from_run(&reloaded).unwrap()]);
    assert_eq!(a, b);
}

#[test]
fn summary_verdict_requires_every_suite() {
    let dir = tempfile::tempdir().unwrap();
    let t = Threshold::at_least(0.8);
    let good = run(
        "market",
        scores("trajectory", &[1.0, 1.0], t),
        Thresholds::new().with("trajectory", t),
    );
    let bad = run(
        "portfolio",
        scores("trajectory", &[0.0, 0.5], t),
        Thresholds::new().with("trajectory", t),
    );
    let reports = vec![
        SuiteReport::from_run(&good).unwrap(),
        SuiteReport::from_run(&bad).unwrap(),
    ];

    let (summary, files) =
        write_report_artifacts(dir.path(), &reports, 1200, "… (report truncated)").unwrap();

    assert!(!summary.overall_passed);
    assert_eq!(summary.suites.len(), 2);
    assert!(summary.suites[0].overall_passed);
    assert!(!summary.suites[1].overall_passed);
    assert_eq!(read_summary_json(&files.summary_json).unwrap(), summary);

    let md = std::fs::read_to_string(&files.report_md).unwrap();
    assert!(md.contains("**Overall:** ❌ FAILED"));
    assert!(md.contains("## ✅ market"));
    assert!(md.contains("## ❌ portfolio"));
    let bounded = std::fs::read_to_string(&files.truncated_md).unwrap();
    assert!(bounded.len() <= 1200);
}
