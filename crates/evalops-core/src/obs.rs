//! Structured observability hooks for refresh, evaluation and notification
//! lifecycle events.
//!
//! This module provides:
//! - Suite-scoped tracing spans via the `SuiteSpan` RAII guard
//! - Emission functions for key lifecycle events
//!
//! Events are emitted at `info!` level, critical refresh failures at
//! `error!`. Use `--json` on the CLI for JSON lines.

use tracing::{error, info, warn};

use crate::refresh::RefreshOutcome;

/// RAII guard that enters a suite-scoped span for the duration of a run.
///
/// ```ignore
/// let _span = SuiteSpan::enter("6f1c...", "market");
/// // every event below carries run_id and suite
/// ```
pub struct SuiteSpan {
    _span: tracing::span::EnteredSpan,
}

impl SuiteSpan {
    pub fn enter(run_id: &str, suite: &str) -> Self {
        Self {
            _span: suite_span(run_id, suite).entered(),
        }
    }
}

/// Suite-scoped span for async sections; attach with `Instrument::instrument`.
pub fn suite_span(run_id: &str, suite: &str) -> tracing::Span {
    tracing::info_span!("evalops.suite", run_id = %run_id, suite = %suite)
}

pub fn emit_refresh_started(dataset: &str, tag: &str) {
    info!(event = "refresh.started", dataset = %dataset, tag = %tag);
}

pub fn emit_refresh_finished(outcome: &RefreshOutcome, duration_ms: u64) {
    info!(
        event = "refresh.finished",
        dataset = %outcome.dataset,
        tag = %outcome.generation_tag,
        deleted = outcome.deleted,
        created = outcome.created,
        atomic = outcome.atomic,
        duration_ms = duration_ms,
    );
}

/// A refresh left a dataset empty.
pub fn emit_refresh_critical(dataset: &str, err: &dyn std::fmt::Display) {
    error!(event = "refresh.critical", dataset = %dataset, error = %err);
}

pub fn emit_suite_started(suite: &str, agent: &str, generation_tag: &str, examples: usize) {
    info!(
        event = "suite.started",
        suite = %suite,
        agent = %agent,
        tag = %generation_tag,
        examples = examples,
    );
}

pub fn emit_example_scored(example_id: &str, metric: &str, score: f64, passed: bool) {
    info!(
        event = "example.scored",
        example_id = %example_id,
        metric = %metric,
        score = score,
        passed = passed,
    );
}

pub fn emit_suite_finished(suite: &str, duration_ms: u64, results: usize, cancelled: usize) {
    info!(
        event = "suite.finished",
        suite = %suite,
        duration_ms = duration_ms,
        results = results,
        cancelled = cancelled,
    );
}

pub fn emit_aggregate_evaluated(suite: &str, examples: usize, passed: bool) {
    info!(
        event = "aggregate.evaluated",
        suite = %suite,
        examples = examples,
        passed = passed,
    );
}

pub fn emit_notify_delivered(status: u16, attempts: u8) {
    info!(event = "notify.delivered", status = status, attempts = attempts);
}

/// Notification failures never change the verdict, so this is a warning.
pub fn emit_notify_failed(err: &dyn std::fmt::Display) {
    warn!(event = "notify.failed", error = %err);
}
