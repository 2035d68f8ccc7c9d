//! Evaluator engine.
//!
//! Every evaluator maps `(input, actual trace, reference)` to a [`Score`].
//! [`Evaluator`] dispatches by variant; [`MetricEvaluator`] binds one to a
//! metric name and threshold, and [`evaluate_example`] turns scores and
//! errors into [`EvaluationResult`]s.

pub mod judge;
pub mod tool_args;
pub mod trajectory;
pub mod value_eq;

use std::sync::Arc;

use example_store::{Conversation, Example, ExampleId, ReferenceTrace};
use tracing::warn;

use crate::config::{EvaluatorConfig, EvaluatorKind};
use crate::domain::{ConfigError, EvaluationResult, FailureKind, JudgeError, Trace};
use crate::threshold::{Threshold, Thresholds};

pub use judge::{
    parse_judgment, JudgeEvaluator, JudgeModel, JudgePrompt, JudgeScale, OpenAiCompatJudge, Rubric,
};
pub use tool_args::ToolArgsMatch;
pub use trajectory::{jaccard, TrajectoryMatch, TrajectoryMode};

/// Raw evaluator output before a threshold is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub value: f64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum Evaluator {
    Trajectory(TrajectoryMatch),
    ToolArgs(ToolArgsMatch),
    Judge(JudgeEvaluator),
}

impl Evaluator {
    pub async fn score(
        &self,
        input: &Conversation,
        actual: &Trace,
        reference: &ReferenceTrace,
    ) -> Result<Score, JudgeError> {
        match self {
            Evaluator::Trajectory(m) => Ok(m.score(actual, reference)),
            Evaluator::ToolArgs(m) => Ok(m.score(actual, reference)),
            Evaluator::Judge(j) => j.score(input, actual, reference).await,
        }
    }
}

/// An evaluator bound to the metric it reports and that metric's threshold.
#[derive(Debug, Clone)]
pub struct MetricEvaluator {
    pub metric: String,
    pub threshold: Threshold,
    pub evaluator: Evaluator,
}

impl MetricEvaluator {
    pub fn new(metric: impl Into<String>, threshold: Threshold, evaluator: Evaluator) -> Self {
        Self {
            metric: metric.into(),
            threshold,
            evaluator,
        }
    }

    /// Build from configuration. `judge` is required for judge evaluators.
    pub fn from_config(
        suite: &str,
        config: &EvaluatorConfig,
        judge: Option<&Arc<dyn JudgeModel>>,
    ) -> Result<Self, ConfigError> {
        let threshold = config.threshold.ok_or_else(|| ConfigError::MissingThreshold {
            suite: suite.to_string(),
            metric: config.metric.clone(),
        })?;
        let evaluator = match &config.kind {
            EvaluatorKind::Trajectory { mode } => Evaluator::Trajectory(TrajectoryMatch::new(*mode)),
            EvaluatorKind::ToolArgs { tolerance } => {
                Evaluator::ToolArgs(ToolArgsMatch::new(*tolerance))
            }
            EvaluatorKind::Judge {
                rubric,
                scale,
                instructions,
            } => {
                let model = judge.ok_or_else(|| ConfigError::JudgeNotConfigured {
                    suite: suite.to_string(),
                })?;
                let mut j = JudgeEvaluator::new(Arc::clone(model), *rubric, *scale);
                if let Some(text) = instructions {
                    j = j.with_instructions(text.clone());
                }
                Evaluator::Judge(j)
            }
        };
        Ok(Self::new(config.metric.clone(), threshold, evaluator))
    }
}

/// Thresholds of `evaluators` in declaration order.
pub fn thresholds_of(evaluators: &[MetricEvaluator]) -> Thresholds {
    let mut thresholds = Thresholds::new();
    for e in evaluators {
        thresholds.insert(e.metric.clone(), e.threshold);
    }
    thresholds
}

/// Score one example on every metric.
///
/// Evaluator errors become zero-score failed results; nothing is dropped.
pub async fn evaluate_example(
    evaluators: &[MetricEvaluator],
    example: &Example,
    trace: &Trace,
) -> Vec<EvaluationResult> {
    let mut results = Vec::with_capacity(evaluators.len());
    for e in evaluators {
        let result = match e.evaluator.score(&example.input, trace, &example.reference).await {
            Ok(score) => EvaluationResult {
                example_id: example.id.clone(),
                metric: e.metric.clone(),
                passed: e.threshold.is_met(score.value),
                score: score.value,
                reason: score.reason,
                failure: None,
            },
            Err(err) => {
                let kind = match err {
                    JudgeError::Parse { .. } => FailureKind::JudgeParse,
                    JudgeError::Request(_) => FailureKind::Judge,
                };
                warn!(example_id = %example.id.short(), metric = %e.metric, error = %err, "evaluator failed");
                EvaluationResult::failed(example.id.clone(), e.metric.clone(), kind, err.to_string())
            }
        };
        results.push(result);
    }
    results
}

/// One zero-score result per metric, recording why `example_id` was not scored.
pub fn failed_results(
    evaluators: &[MetricEvaluator],
    example_id: &ExampleId,
    kind: FailureKind,
    reason: &str,
) -> Vec<EvaluationResult> {
    evaluators
        .iter()
        .map(|e| EvaluationResult::failed(example_id.clone(), e.metric.clone(), kind, reason))
        .collect()
}
