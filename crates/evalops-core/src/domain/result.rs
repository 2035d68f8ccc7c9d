//! Per-(example, metric) evaluation results.

use example_store::ExampleId;
use serde::{Deserialize, Serialize};

/// Why an example was scored without a successful evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The agent invocation failed, timed out or returned garbage.
    Invocation,
    /// The judge answered but its output could not be parsed.
    JudgeParse,
    /// The judge model could not be reached.
    Judge,
    /// The run was cancelled before this example started.
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Invocation => "invocation",
            FailureKind::JudgeParse => "judge_parse",
            FailureKind::Judge => "judge",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

/// Score for one example on one metric. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub example_id: ExampleId,
    pub metric: String,
    pub score: f64,
    pub passed: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl EvaluationResult {
    /// Zero-score result recording an error in place of a score.
    pub fn failed(
        example_id: ExampleId,
        metric: impl Into<String>,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            example_id,
            metric: metric.into(),
            score: 0.0,
            passed: false,
            reason: reason.into(),
            failure: Some(kind),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_scores_zero() {
        let r = EvaluationResult::failed(
            ExampleId::from("ab".repeat(32)),
            "relevance",
            FailureKind::JudgeParse,
            "unparsable judge output",
        );
        assert_eq!(r.score, 0.0);
        assert!(!r.passed);
        assert!(r.is_failure());

        let raw = serde_json::to_value(&r).unwrap();
        assert_eq!(raw["failure"], "judge_parse");
    }
}
