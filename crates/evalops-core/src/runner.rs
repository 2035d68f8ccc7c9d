//! Suite runner: invoke the agent on every example and score the traces.
//!
//! Examples are independent, so they run concurrently on a bounded pool.
//! Cancellation stops new invocations; calls already in flight finish or
//! hit the invoker timeout. Examples that never started are recorded as
//! `cancelled` zero-score results so the denominator stays honest.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use example_store::{Example, ExampleStore};
use tokio::sync::{watch, Semaphore};
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::domain::{EvaluationResult, FailureKind, SnapshotError};
use crate::evaluators::{evaluate_example, failed_results, thresholds_of, MetricEvaluator};
use crate::invoke::{AgentInvoker, AgentRef};
use crate::metrics::METRICS;
use crate::obs;
use crate::refresh::load_snapshot;
use crate::reporting::{RunArtifact, SCHEMA_VERSION};

/// Results of running one suite over a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteRun {
    /// Sorted by (example order, evaluator declaration order).
    pub results: Vec<EvaluationResult>,
    /// Examples skipped because the run was cancelled.
    pub cancelled: usize,
}

pub struct SuiteRunner {
    suite: String,
    agent: AgentRef,
    invoker: AgentInvoker,
    evaluators: Arc<Vec<MetricEvaluator>>,
    concurrency: usize,
}

impl SuiteRunner {
    pub fn new(
        suite: impl Into<String>,
        agent: AgentRef,
        invoker: AgentInvoker,
        evaluators: Vec<MetricEvaluator>,
        concurrency: usize,
    ) -> Self {
        Self {
            suite: suite.into(),
            agent,
            invoker,
            evaluators: Arc::new(evaluators),
            concurrency: concurrency.max(1),
        }
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn agent(&self) -> &AgentRef {
        &self.agent
    }

    pub fn evaluators(&self) -> &[MetricEvaluator] {
        &self.evaluators
    }

    /// Evaluate `examples`. Once `cancel` reads `true`, examples that have
    /// not started are recorded as cancelled.
    pub async fn run(&self, examples: Vec<Example>, cancel: watch::Receiver<bool>) -> SuiteRun {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut ids = Vec::with_capacity(examples.len());
        let mut tasks = Vec::with_capacity(examples.len());

        for example in examples {
            let sem = Arc::clone(&sem);
            let cancel = cancel.clone();
            let invoker = self.invoker.clone();
            let evaluators = Arc::clone(&self.evaluators);
            let agent = self.agent.clone();
            let example_id = example.id.clone();

            let task = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();

                if *cancel.borrow() {
                    return (
                        true,
                        failed_results(
                            &evaluators,
                            &example.id,
                            FailureKind::Cancelled,
                            "run cancelled before this example started",
                        ),
                    );
                }

                METRICS.inc_examples_invoked();
                let results = match invoker.invoke(&agent, &example.input).await {
                    Ok(trace) => evaluate_example(&evaluators, &example, &trace).await,
                    Err(e) => {
                        warn!(example_id = %example.id.short(), error = %e, "agent invocation failed");
                        failed_results(
                            &evaluators,
                            &example.id,
                            FailureKind::Invocation,
                            &e.to_string(),
                        )
                    }
                };
                for r in &results {
                    obs::emit_example_scored(r.example_id.short(), &r.metric, r.score, r.passed);
                }
                (false, results)
            });
            ids.push(example_id);
            tasks.push(task);
        }

        let mut results = Vec::new();
        let mut cancelled = 0;
        // join_all keeps spawn order, so results keep example order.
        let joined = futures::future::join_all(tasks).await;
        for (example_id, outcome) in ids.into_iter().zip(joined) {
            match outcome {
                Ok((was_cancelled, example_results)) => {
                    if was_cancelled {
                        cancelled += 1;
                    }
                    METRICS.record_results(&example_results);
                    results.extend(example_results);
                }
                Err(e) => {
                    warn!(example_id = %example_id.short(), error = %e, "example task aborted");
                    let aborted = failed_results(
                        &self.evaluators,
                        &example_id,
                        FailureKind::Invocation,
                        &format!("evaluation task aborted: {e}"),
                    );
                    METRICS.record_results(&aborted);
                    results.extend(aborted);
                }
            }
        }
        SuiteRun { results, cancelled }
    }
}

/// Snapshot `dataset`, run the suite over it and package the results.
///
/// Fails only if the snapshot cannot be materialized; no agent is invoked
/// in that case.
pub async fn run_suite(
    store: &dyn ExampleStore,
    runner: &SuiteRunner,
    dataset: &str,
    expected_tag: Option<&str>,
    cancel: watch::Receiver<bool>,
) -> Result<RunArtifact, SnapshotError> {
    let snapshot = load_snapshot(store, dataset, expected_tag).await?;
    let run_id = Uuid::new_v4();
    let span = obs::suite_span(&run_id.to_string(), runner.suite());

    let started_at = Utc::now();
    let clock = Instant::now();
    obs::emit_suite_started(
        runner.suite(),
        runner.agent().as_str(),
        &snapshot.generation_tag,
        snapshot.examples.len(),
    );

    let run = runner.run(snapshot.examples, cancel).instrument(span).await;
    obs::emit_suite_finished(
        runner.suite(),
        clock.elapsed().as_millis() as u64,
        run.results.len(),
        run.cancelled,
    );

    Ok(RunArtifact {
        schema_version: SCHEMA_VERSION.to_string(),
        run_id,
        suite: runner.suite().to_string(),
        agent: runner.agent().to_string(),
        dataset: snapshot.dataset,
        generation_tag: snapshot.generation_tag,
        started_at,
        finished_at: Utc::now(),
        cancelled: run.cancelled > 0,
        thresholds: thresholds_of(runner.evaluators()),
        results: run.results,
    })
}
