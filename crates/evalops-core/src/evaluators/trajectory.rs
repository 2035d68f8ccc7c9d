//! Tool trajectory match.

use std::collections::BTreeSet;

use example_store::ReferenceTrace;
use serde::{Deserialize, Serialize};

use super::Score;
use crate::domain::Trace;

/// How actual and reference tool trajectories are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryMode {
    /// Jaccard similarity of the tool-name sets. Order and repeats ignored.
    #[default]
    Unordered,
    /// 1.0 only if the ordered tool-name sequences are identical.
    Strict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrajectoryMatch {
    pub mode: TrajectoryMode,
}

impl TrajectoryMatch {
    pub fn new(mode: TrajectoryMode) -> Self {
        Self { mode }
    }

    pub fn score(&self, actual: &Trace, reference: &ReferenceTrace) -> Score {
        match self.mode {
            TrajectoryMode::Unordered => unordered(actual, reference),
            TrajectoryMode::Strict => strict(actual, reference),
        }
    }
}

/// |A ∩ B| / |A ∪ B|, or 1.0 when both sets are empty.
pub fn jaccard(actual: &BTreeSet<&str>, expected: &BTreeSet<&str>) -> f64 {
    let union = actual.union(expected).count();
    if union == 0 {
        return 1.0;
    }
    actual.intersection(expected).count() as f64 / union as f64
}

fn unordered(actual: &Trace, reference: &ReferenceTrace) -> Score {
    let actual_set = actual.tool_names();
    let expected_set: BTreeSet<&str> = reference.tool_calls.iter().map(|c| c.name.as_str()).collect();

    let value = jaccard(&actual_set, &expected_set);
    let shared = actual_set.intersection(&expected_set).count();
    let union = actual_set.union(&expected_set).count();

    let mut reason = format!("{shared}/{union} tools in common");
    let missing: Vec<&str> = expected_set.difference(&actual_set).copied().collect();
    let unexpected: Vec<&str> = actual_set.difference(&expected_set).copied().collect();
    if !missing.is_empty() {
        reason.push_str(&format!("; missing: {}", missing.join(", ")));
    }
    if !unexpected.is_empty() {
        reason.push_str(&format!("; unexpected: {}", unexpected.join(", ")));
    }
    Score { value, reason }
}

fn strict(actual: &Trace, reference: &ReferenceTrace) -> Score {
    let actual_seq: Vec<&str> = actual.tool_calls().map(|c| c.name.as_str()).collect();
    let expected_seq: Vec<&str> = reference.tool_calls.iter().map(|c| c.name.as_str()).collect();

    if actual_seq == expected_seq {
        return Score {
            value: 1.0,
            reason: format!("sequence of {} tool calls matches", expected_seq.len()),
        };
    }
    let diverges_at = actual_seq
        .iter()
        .zip(expected_seq.iter())
        .position(|(a, e)| a != e)
        .unwrap_or_else(|| actual_seq.len().min(expected_seq.len()));
    Score {
        value: 0.0,
        reason: format!(
            "sequence diverges at call {}: expected [{}], got [{}]",
            diverges_at + 1,
            expected_seq.join(", "),
            actual_seq.join(", ")
        ),
    }
}
