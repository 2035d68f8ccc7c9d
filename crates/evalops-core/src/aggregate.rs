//! Threshold and aggregation engine.
//!
//! Groups [`EvaluationResult`]s by metric, applies the configured
//! [`Threshold`] to each metric mean and derives the overall verdict. This
//! is the only place `overall_passed` is computed.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, EvaluationResult};
use crate::threshold::{Threshold, Thresholds};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Aggregate for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: String,
    pub mean_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    /// Examples whose own score met the threshold.
    pub pass_count: usize,
    pub total_count: usize,
    /// Results recorded in place of a score (invocation, judge, cancellation).
    pub failure_count: usize,
    pub threshold: Threshold,
    pub passed: bool,
}

/// Verdict over every metric of a run. Recomputed from scratch each time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    /// Metrics in threshold declaration order.
    pub metrics: Vec<MetricSummary>,
    pub overall_passed: bool,
    /// Distinct examples with at least one result.
    pub examples_evaluated: usize,
}

impl AggregateReport {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.metric == name)
    }

    pub fn failed_metrics(&self) -> impl Iterator<Item = &MetricSummary> {
        self.metrics.iter().filter(|m| !m.passed)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Aggregate `results` against `thresholds`.
///
/// A result for a metric without a threshold is a configuration error. A
/// configured metric with no results fails rather than being skipped.
pub fn aggregate(
    results: &[EvaluationResult],
    thresholds: &Thresholds,
) -> Result<AggregateReport, ConfigError> {
    let mut by_metric: BTreeMap<&str, Vec<&EvaluationResult>> = BTreeMap::new();
    for r in results {
        if thresholds.get(&r.metric).is_none() {
            return Err(ConfigError::UnconfiguredMetric {
                metric: r.metric.clone(),
            });
        }
        by_metric.entry(r.metric.as_str()).or_default().push(r);
    }

    let metrics: Vec<MetricSummary> = thresholds
        .iter()
        .map(|mt| {
            let group = by_metric.get(mt.metric.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            summarize(&mt.metric, mt.threshold, group)
        })
        .collect();

    let overall_passed = metrics.iter().all(|m| m.passed);
    let examples_evaluated = results
        .iter()
        .map(|r| &r.example_id)
        .collect::<HashSet<_>>()
        .len();

    Ok(AggregateReport {
        metrics,
        overall_passed,
        examples_evaluated,
    })
}

fn summarize(metric: &str, threshold: Threshold, group: &[&EvaluationResult]) -> MetricSummary {
    if group.is_empty() {
        return MetricSummary {
            metric: metric.to_string(),
            mean_score: 0.0,
            min_score: 0.0,
            max_score: 0.0,
            pass_count: 0,
            total_count: 0,
            failure_count: 0,
            threshold,
            passed: false,
        };
    }

    let total = group.len();
    let sum: f64 = group.iter().map(|r| r.score).sum();
    let mean_score = sum / total as f64;
    let min_score = group.iter().map(|r| r.score).fold(f64::INFINITY, f64::min);
    let max_score = group.iter().map(|r| r.score).fold(f64::NEG_INFINITY, f64::max);

    let failure_count = group.iter().filter(|r| r.is_failure()).count();
    // Failures carry a zero score, which only counts against the metric when
    // higher is better. Otherwise any failure fails the metric outright.
    let passed = threshold.is_met(mean_score)
        && (threshold.op.rewards_high_scores() || failure_count == 0);

    MetricSummary {
        metric: metric.to_string(),
        mean_score,
        min_score,
        max_score,
        pass_count: group.iter().filter(|r| r.passed).count(),
        total_count: total,
        failure_count,
        threshold,
        passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureKind;
    use example_store::ExampleId;

    fn result(example: &str, metric: &str, score: f64) -> EvaluationResult {
        EvaluationResult {
            example_id: ExampleId::from(example.to_string()),
            metric: metric.to_string(),
            score,
            passed: score >= 0.8,
            reason: String::new(),
            failure: None,
        }
    }

    #[test]
    fn unconfigured_metric_is_fatal() {
        let thresholds = Thresholds::new().with("trajectory", Threshold::at_least(0.8));
        let err = aggregate(&[result("e1", "relevance", 1.0)], &thresholds).unwrap_err();
        assert!(matches!(err, ConfigError::UnconfiguredMetric { .. }));
    }

    #[test]
    fn metric_without_results_fails() {
        let thresholds = Thresholds::new()
            .with("trajectory", Threshold::at_least(0.8))
            .with("relevance", Threshold::at_least(0.8));
        let report = aggregate(&[result("e1", "trajectory", 1.0)], &thresholds).unwrap();
        let relevance = report.metric("relevance").unwrap();
        assert_eq!(relevance.total_count, 0);
        assert!(!relevance.passed);
        assert!(!report.overall_passed);
    }

    #[test]
    fn failures_count_toward_the_mean() {
        let thresholds = Thresholds::new().with("relevance", Threshold::at_least(0.6));
        let mut failed = result("e2", "relevance", 0.0);
        failed.failure = Some(FailureKind::JudgeParse);
        let report = aggregate(&[result("e1", "relevance", 1.0), failed], &thresholds).unwrap();
        let m = report.metric("relevance").unwrap();
        assert_eq!(m.mean_score, 0.5);
        assert_eq!(m.failure_count, 1);
        assert_eq!(m.min_score, 0.0);
        assert_eq!(m.max_score, 1.0);
        assert!(!report.overall_passed);
        assert_eq!(report.examples_evaluated, 2);
    }

    #[test]
    fn metrics_follow_declaration_order() {
        let thresholds = Thresholds::new()
            .with("zeta", Threshold::at_least(0.0))
            .with("alpha", Threshold::at_least(0.0));
        let report = aggregate(
            &[result("e1", "alpha", 1.0), result("e1", "zeta", 1.0)],
            &thresholds,
        )
        .unwrap();
        let names: Vec<_> = report.metrics.iter().map(|m| m.metric.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(report.examples_evaluated, 1);
    }
}
