//! Process-wide run-health counters.
//!
//! Evaluation results are classified by [`FailureKind`] as they are
//! produced, so a run that "passed" on few real scores is visible at a
//! glance. The CLI prints a [`MetricsSnapshot`] after `evaluate` and
//! [`Metrics::flush`] logs the same values once at exit.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::domain::{EvaluationResult, FailureKind};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    examples_invoked: AtomicU64,
    results_scored: AtomicU64,
    invocation_failures: AtomicU64,
    judge_parse_failures: AtomicU64,
    judge_failures: AtomicU64,
    cancelled: AtomicU64,
    datasets_refreshed: AtomicU64,
    critical_refreshes: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub examples_invoked: u64,
    pub results_scored: u64,
    pub invocation_failures: u64,
    pub judge_parse_failures: u64,
    pub judge_failures: u64,
    pub cancelled: u64,
    pub datasets_refreshed: u64,
    pub critical_refreshes: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}

impl MetricsSnapshot {
    /// Results recorded in place of a score, of any kind.
    pub fn failed_results(&self) -> u64 {
        self.invocation_failures + self.judge_parse_failures + self.judge_failures + self.cancelled
    }

    /// Counter growth since `earlier`; other commands in the same process
    /// may have moved the global counters before this one ran.
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            examples_invoked: self.examples_invoked.saturating_sub(earlier.examples_invoked),
            results_scored: self.results_scored.saturating_sub(earlier.results_scored),
            invocation_failures: self
                .invocation_failures
                .saturating_sub(earlier.invocation_failures),
            judge_parse_failures: self
                .judge_parse_failures
                .saturating_sub(earlier.judge_parse_failures),
            judge_failures: self.judge_failures.saturating_sub(earlier.judge_failures),
            cancelled: self.cancelled.saturating_sub(earlier.cancelled),
            datasets_refreshed: self
                .datasets_refreshed
                .saturating_sub(earlier.datasets_refreshed),
            critical_refreshes: self
                .critical_refreshes
                .saturating_sub(earlier.critical_refreshes),
            notifications_sent: self
                .notifications_sent
                .saturating_sub(earlier.notifications_sent),
            notifications_failed: self
                .notifications_failed
                .saturating_sub(earlier.notifications_failed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            examples_invoked: AtomicU64::new(0),
            results_scored: AtomicU64::new(0),
            invocation_failures: AtomicU64::new(0),
            judge_parse_failures: AtomicU64::new(0),
            judge_failures: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            datasets_refreshed: AtomicU64::new(0),
            critical_refreshes: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
        }
    }

    /// An agent call was made, whatever its outcome.
    pub fn inc_examples_invoked(&self) {
        self.examples_invoked.fetch_add(1, Ordering::Relaxed);
    }

    /// Classify each result: a real score, or one counter per failure kind.
    pub fn record_results(&self, results: &[EvaluationResult]) {
        for r in results {
            let counter = match r.failure {
                None => &self.results_scored,
                Some(FailureKind::Invocation) => &self.invocation_failures,
                Some(FailureKind::JudgeParse) => &self.judge_parse_failures,
                Some(FailureKind::Judge) => &self.judge_failures,
                Some(FailureKind::Cancelled) => &self.cancelled,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_datasets_refreshed(&self) {
        self.datasets_refreshed.fetch_add(1, Ordering::Relaxed);
    }

    /// A refresh left its dataset empty.
    pub fn inc_critical_refreshes(&self) {
        self.critical_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            examples_invoked: self.examples_invoked.load(Ordering::Relaxed),
            results_scored: self.results_scored.load(Ordering::Relaxed),
            invocation_failures: self.invocation_failures.load(Ordering::Relaxed),
            judge_parse_failures: self.judge_parse_failures.load(Ordering::Relaxed),
            judge_failures: self.judge_failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            datasets_refreshed: self.datasets_refreshed.load(Ordering::Relaxed),
            critical_refreshes: self.critical_refreshes.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            examples_invoked = s.examples_invoked,
            results_scored = s.results_scored,
            results_failed = s.failed_results(),
            invocation_failures = s.invocation_failures,
            judge_parse_failures = s.judge_parse_failures,
            judge_failures = s.judge_failures,
            cancelled = s.cancelled,
            datasets_refreshed = s.datasets_refreshed,
            critical_refreshes = s.critical_refreshes,
            notifications_sent = s.notifications_sent,
            notifications_failed = s.notifications_failed,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use example_store::ExampleId;

    fn scored(metric: &str) -> EvaluationResult {
        EvaluationResult {
            example_id: ExampleId::from("a".repeat(64)),
            metric: metric.to_string(),
            score: 1.0,
            passed: true,
            reason: String::new(),
            failure: None,
        }
    }

    fn failed(kind: FailureKind) -> EvaluationResult {
        EvaluationResult::failed(ExampleId::from("b".repeat(64)), "relevance", kind, "x")
    }

    #[test]
    fn results_are_classified_by_failure_kind() {
        let m = Metrics::new();
        m.record_results(&[
            scored("trajectory"),
            scored("tool_args"),
            failed(FailureKind::JudgeParse),
            failed(FailureKind::Invocation),
            failed(FailureKind::Cancelled),
            failed(FailureKind::Cancelled),
        ]);

        let s = m.snapshot();
        assert_eq!(s.results_scored, 2);
        assert_eq!(s.judge_parse_failures, 1);
        assert_eq!(s.invocation_failures, 1);
        assert_eq!(s.judge_failures, 0);
        assert_eq!(s.cancelled, 2);
        assert_eq!(s.failed_results(), 4);
    }

    #[test]
    fn since_reports_growth_only() {
        let m = Metrics::new();
        m.inc_examples_invoked();
        m.inc_notifications_failed();
        let before = m.snapshot();

        m.inc_examples_invoked();
        m.inc_examples_invoked();
        m.record_results(&[failed(FailureKind::Judge)]);

        let delta = m.snapshot().since(&before);
        assert_eq!(delta.examples_invoked, 2);
        assert_eq!(delta.judge_failures, 1);
        assert_eq!(delta.notifications_failed, 0);
    }
}
