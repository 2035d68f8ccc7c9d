//! evalops core library
//!
//! Scheduled evaluation of LLM agents against periodically refreshed
//! reference datasets:
//!
//! - `refresh`: replace a dataset's examples without mixing generations
//! - `invoke`: run the agent under test and record its trace
//! - `evaluators`: trajectory, tool-argument and LLM-judge scoring
//! - `aggregate`: per-metric means against thresholds, overall verdict
//! - `reporting`: deterministic markdown, bounded notification body, JSON summary
//! - `runner`: bounded-concurrency suite execution with cancellation

pub mod aggregate;
pub mod config;
pub mod domain;
pub mod evaluators;
pub mod invoke;
pub mod metrics;
pub mod obs;
pub mod refresh;
pub mod reporting;
pub mod runner;
pub mod source;
pub mod telemetry;
pub mod threshold;

pub use aggregate::{aggregate, AggregateReport, MetricSummary};
pub use config::{
    DatasetConfig, EvalConfig, EvaluatorConfig, EvaluatorKind, JudgeConfig, ReportConfig,
    SuiteConfig,
};
pub use domain::{
    ConfigError, EvaluationResult, FailureKind, FetchError, InvocationError, JudgeError,
    RefreshError, SnapshotError, Trace, TraceEvent,
};
pub use evaluators::{
    evaluate_example, failed_results, jaccard, parse_judgment, Evaluator, JudgeEvaluator,
    JudgeModel, JudgePrompt, JudgeScale, MetricEvaluator, OpenAiCompatJudge, Rubric, Score,
    ToolArgsMatch, TrajectoryMatch, TrajectoryMode,
};
pub use invoke::{parse_trace, AgentInvoker, AgentRef, AgentRuntime, HttpAgentRuntime};
pub use refresh::{generation_tag, load_snapshot, RefreshManager, RefreshOutcome, Snapshot};
pub use reporting::{
    build_notification, metric_description, read_run_json, read_summary_json, render_report_md,
    truncate_lines, write_report_artifacts, write_run_json, write_summary_json, NotifyContext,
    ReportFiles, RunArtifact, SuiteReport, SummaryArtifact, Truncated,
};
pub use runner::{run_suite, SuiteRun, SuiteRunner};
pub use source::{
    source_for, ExampleSeed, ExampleSource, FileExampleSource, HttpExampleSource,
};
pub use threshold::{CompareOp, Threshold, Thresholds};

pub use metrics::{MetricsSnapshot, METRICS};
pub use obs::SuiteSpan;
pub use telemetry::init_tracing;

/// evalops version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
