//! evalops - scheduled evaluation of LLM agents
//!
//! ## Commands
//!
//! - `refresh`: replace configured datasets with freshly fetched examples
//! - `evaluate`: run suites against the current dataset generation
//! - `report`: regenerate markdown and summary from results files
//! - `notify`: post the bounded report to a webhook
//!
//! ## Exit codes
//!
//! 0 pass, 1 threshold failure, 2 infrastructure error, 3 configuration
//! error, 4 critical dataset state.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use evalops_core::{
    build_notification, generation_tag, init_tracing, obs, read_run_json, read_summary_json,
    run_suite, source_for, truncate_lines, write_report_artifacts, write_run_json, AgentInvoker,
    AgentRef, AgentRuntime, ConfigError, EvalConfig, HttpAgentRuntime, JudgeModel, MetricEvaluator,
    MetricsSnapshot, NotifyContext, OpenAiCompatJudge, RefreshError, RefreshManager, SnapshotError,
    SuiteConfig, SuiteReport, SuiteRunner, SuiteSpan, METRICS,
};
use example_store::FsExampleStore;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use webhook_notify::{PayloadLimits, WebhookConfig, WebhookDispatcher};

const EXIT_THRESHOLD_FAILED: u8 = 1;
const EXIT_INFRASTRUCTURE: u8 = 2;
const EXIT_CONFIG: u8 = 3;
const EXIT_CRITICAL: u8 = 4;

#[derive(Parser)]
#[command(name = "evalops")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scheduled evaluation pipeline for LLM agents", long_about = None)]
struct Cli {
    /// Path to the evalops configuration file
    #[arg(short, long, global = true, env = "EVALOPS_CONFIG", default_value = "evalops.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace datasets with freshly fetched reference examples
    Refresh {
        /// Dataset to refresh (repeatable; default: every configured dataset)
        #[arg(short, long)]
        dataset: Vec<String>,

        /// Generation tag (default: rendered from the configured format)
        #[arg(long)]
        tag: Option<String>,

        /// Reference date for `{today}` and the tag (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Evaluate agents against the current dataset generation
    Evaluate {
        /// Suite to run
        #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
        suite: Option<String>,

        /// Run every configured suite
        #[arg(long)]
        all: bool,

        /// Refuse to run unless the dataset carries this generation tag
        #[arg(long)]
        generation: Option<String>,

        /// Directory for results and report artifacts
        #[arg(short, long, default_value = "evalops-out")]
        out_dir: PathBuf,
    },

    /// Regenerate the report and summary from results files
    Report {
        /// `<suite>.results.json` files
        #[arg(short, long, required = true, num_args = 1..)]
        results: Vec<PathBuf>,

        /// Directory for report artifacts
        #[arg(short, long, default_value = "evalops-out")]
        out_dir: PathBuf,
    },

    /// Send the bounded report to a webhook
    Notify {
        /// Report markdown (full or truncated)
        #[arg(long)]
        report: PathBuf,

        /// summary.json written by `evaluate` or `report`
        #[arg(long)]
        summary: PathBuf,

        /// Webhook destination URL
        #[arg(long, env = "EVALOPS_WEBHOOK_URL")]
        webhook: Option<String>,

        /// Branch shown in the notification
        #[arg(long, env = "GITHUB_REF_NAME")]
        branch: Option<String>,

        /// Actor shown in the notification
        #[arg(long, env = "GITHUB_ACTOR")]
        actor: Option<String>,

        /// Repository shown in the notification
        #[arg(long, env = "GITHUB_REPOSITORY")]
        repository: Option<String>,

        /// CI run id shown in the notification
        #[arg(long, env = "GITHUB_RUN_ID")]
        run_id: Option<String>,
    },
}

/// Outcome of a command that completed without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    fn from_passed(passed: bool) -> Self {
        if passed {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let outcome = run(cli).await;
    METRICS.flush();

    match outcome {
        Ok(Verdict::Passed) => ExitCode::SUCCESS,
        Ok(Verdict::Failed) => ExitCode::from(EXIT_THRESHOLD_FAILED),
        Err(e) => {
            error!(error = %format!("{e:#}"), "evalops failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<Verdict> {
    let config = EvalConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {:?}", cli.config))?;
    let base_dir = cli
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    match cli.command {
        Commands::Refresh { dataset, tag, date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            cmd_refresh(&config, &base_dir, &dataset, tag.as_deref(), date).await
        }
        Commands::Evaluate {
            suite,
            all,
            generation,
            out_dir,
        } => {
            let suites: Vec<&SuiteConfig> = if all {
                config.suites.iter().collect()
            } else {
                let name = suite.as_deref().unwrap_or_default();
                vec![config.suite(name)?]
            };
            let runtime: Arc<dyn AgentRuntime> = Arc::new(
                HttpAgentRuntime::new(config.runtime.endpoint.clone(), config.runtime.timeout())
                    .context("Failed to build agent runtime client")?,
            );
            let judge = build_judge(&config)?;
            let cancel = cancel_on_ctrl_c();
            cmd_evaluate(
                &config,
                &base_dir,
                &suites,
                runtime,
                judge,
                generation.as_deref(),
                &out_dir,
                cancel,
            )
            .await
        }
        Commands::Report { results, out_dir } => cmd_report(&config, &results, &out_dir),
        Commands::Notify {
            report,
            summary,
            webhook,
            branch,
            actor,
            repository,
            run_id,
        } => {
            let ctx = NotifyContext {
                branch,
                actor,
                repository,
                run_id,
                results_url: config.report.results_url.clone(),
            };
            cmd_notify(&config, &report, &summary, webhook.as_deref(), &ctx).await
        }
    }
}

/// Map an error chain to a process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_CONFIG;
        }
        if let Some(e) = cause.downcast_ref::<RefreshError>() {
            if e.is_critical() {
                return EXIT_CRITICAL;
            }
        }
        if let Some(SnapshotError::Empty { .. }) = cause.downcast_ref::<SnapshotError>() {
            return EXIT_CRITICAL;
        }
    }
    EXIT_INFRASTRUCTURE
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn open_store(config: &EvalConfig, base_dir: &Path) -> Result<Arc<FsExampleStore>> {
    let root = resolve(base_dir, &config.store.root);
    let store = FsExampleStore::new(&root)
        .with_context(|| format!("Failed to open example store at {:?}", root))?;
    Ok(Arc::new(store))
}

fn build_judge(config: &EvalConfig) -> Result<Option<Arc<dyn JudgeModel>>> {
    let Some(judge) = &config.judge else {
        return Ok(None);
    };
    let api_key = match &judge.api_key_env {
        Some(var) => {
            let key = std::env::var(var).ok();
            if key.is_none() {
                warn!(var = %var, "judge API key variable is not set; sending unauthenticated requests");
            }
            key
        }
        None => None,
    };
    let client = OpenAiCompatJudge::new(
        judge.endpoint.clone(),
        judge.model.clone(),
        api_key,
        judge.temperature,
        judge.timeout(),
    )
    .context("Failed to build judge client")?;
    Ok(Some(Arc::new(client)))
}

/// Flip the cancel flag on the first Ctrl-C.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; no new examples will be started");
            tx.send_replace(true);
        }
    });
    rx
}

// ---------------------------------------------------------------------------
// refresh
// ---------------------------------------------------------------------------

async fn cmd_refresh(
    config: &EvalConfig,
    base_dir: &Path,
    only: &[String],
    tag: Option<&str>,
    date: NaiveDate,
) -> Result<Verdict> {
    for name in only {
        if config.dataset(name).is_none() {
            return Err(ConfigError::Invalid(format!("unknown dataset `{name}`")).into());
        }
    }
    let tag = match tag {
        Some(t) => t.to_string(),
        None => generation_tag(&config.refresh.generation_tag_format, date)?,
    };

    let store = open_store(config, base_dir)?;
    let manager = RefreshManager::new(store);

    let mut failures: Vec<(String, RefreshError)> = Vec::new();
    for ds in config
        .datasets
        .iter()
        .filter(|d| only.is_empty() || only.contains(&d.name))
    {
        let source = source_for(&ds.source, base_dir, config.runtime.timeout())
            .with_context(|| format!("Failed to open source for dataset {}", ds.name))?;
        info!(dataset = %ds.name, source = %source.describe(), "fetching examples");

        match manager.refresh(&ds.name, || source.fetch(date), &tag).await {
            Ok(outcome) => println!(
                "✓ {}: {} examples @ {} (replaced {})",
                outcome.dataset, outcome.created, outcome.generation_tag, outcome.deleted
            ),
            Err(e) => {
                println!("✗ {}: {}", ds.name, e);
                failures.push((ds.name.clone(), e));
            }
        }
    }

    // Critical failures outrank ordinary ones when picking the exit code.
    failures.sort_by_key(|(_, e)| !e.is_critical());
    match failures.into_iter().next() {
        None => Ok(Verdict::Passed),
        Some((dataset, e)) => {
            Err(anyhow::Error::new(e).context(format!("Refresh of dataset {dataset} failed")))
        }
    }
}

// ---------------------------------------------------------------------------
// evaluate
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn cmd_evaluate(
    config: &EvalConfig,
    base_dir: &Path,
    suites: &[&SuiteConfig],
    runtime: Arc<dyn AgentRuntime>,
    judge: Option<Arc<dyn JudgeModel>>,
    generation: Option<&str>,
    out_dir: &Path,
    cancel: watch::Receiver<bool>,
) -> Result<Verdict> {
    let store = open_store(config, base_dir)?;
    let invoker = AgentInvoker::new(runtime, config.runtime.timeout());
    std::fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {:?}", out_dir))?;

    let counters_before = METRICS.snapshot();
    let mut reports = Vec::with_capacity(suites.len());
    for suite in suites {
        let evaluators = suite
            .evaluators
            .iter()
            .map(|e| MetricEvaluator::from_config(&suite.name, e, judge.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let runner = SuiteRunner::new(
            suite.name.clone(),
            AgentRef::new(suite.agent.clone()),
            invoker.clone(),
            evaluators,
            suite.concurrency,
        );

        let run = run_suite(
            store.as_ref(),
            &runner,
            &suite.dataset,
            generation,
            cancel.clone(),
        )
        .await
        .with_context(|| format!("Suite {} could not run", suite.name))?;

        let _span = SuiteSpan::enter(&run.run_id.to_string(), &suite.name);
        let results_path = out_dir.join(format!("{}.results.json", suite.name));
        write_run_json(&results_path, &run)?;
        let report = SuiteReport::from_run(&run)?;
        obs::emit_aggregate_evaluated(
            &report.suite,
            report.aggregate.examples_evaluated,
            report.aggregate.overall_passed,
        );
        print_suite(&report);
        reports.push(report);
    }

    print_run_health(&METRICS.snapshot().since(&counters_before));
    finish_reports(config, &reports, out_dir)
}

fn print_run_health(delta: &MetricsSnapshot) {
    println!(
        "{} agent call(s), {} scored result(s), {} failed",
        delta.examples_invoked,
        delta.results_scored,
        delta.failed_results()
    );
    if delta.failed_results() > 0 {
        println!(
            "  invocation {}, judge_parse {}, judge {}, cancelled {}",
            delta.invocation_failures, delta.judge_parse_failures, delta.judge_failures, delta.cancelled
        );
    }
}

fn print_suite(report: &SuiteReport) {
    let status = if report.aggregate.overall_passed {
        "✓ PASSED"
    } else {
        "✗ FAILED"
    };
    println!(
        "{} [{}] {} examples @ {}",
        report.suite, status, report.aggregate.examples_evaluated, report.generation_tag
    );
    for m in &report.aggregate.metrics {
        let mark = if m.passed { "✓" } else { "✗" };
        println!(
            "  {} {}: {:.3} (threshold {}, {}/{} passed)",
            mark, m.metric, m.mean_score, m.threshold, m.pass_count, m.total_count
        );
    }
    if report.cancelled {
        println!("  ! run was cancelled before every example started");
    }
}

fn finish_reports(config: &EvalConfig, reports: &[SuiteReport], out_dir: &Path) -> Result<Verdict> {
    let (summary, files) = write_report_artifacts(
        out_dir,
        reports,
        config.report.body_cap_bytes,
        &config.report.truncation_marker,
    )?;
    println!();
    println!("Report: {}", files.report_md.display());
    println!("Summary: {}", files.summary_json.display());
    println!(
        "Overall: {}",
        if summary.overall_passed {
            "✓ PASSED"
        } else {
            "✗ FAILED"
        }
    );
    Ok(Verdict::from_passed(summary.overall_passed))
}

// ---------------------------------------------------------------------------
// report
// ---------------------------------------------------------------------------

fn cmd_report(config: &EvalConfig, results: &[PathBuf], out_dir: &Path) -> Result<Verdict> {
    let mut reports = Vec::with_capacity(results.len());
    for path in results {
        let run = read_run_json(path)?;
        let report = SuiteReport::from_run(&run)
            .with_context(|| format!("Results file {:?} is inconsistent", path))?;
        reports.push(report);
    }
    finish_reports(config, &reports, out_dir)
}

// ---------------------------------------------------------------------------
// notify
// ---------------------------------------------------------------------------

/// Delivery failures are logged and never change the exit code.
async fn cmd_notify(
    config: &EvalConfig,
    report: &Path,
    summary: &Path,
    webhook: Option<&str>,
    ctx: &NotifyContext,
) -> Result<Verdict> {
    let Some(destination) = webhook.filter(|w| !w.trim().is_empty()) else {
        warn!("no webhook destination configured; skipping notification");
        return Ok(Verdict::Passed);
    };

    let markdown =
        std::fs::read_to_string(report).with_context(|| format!("Failed to read {:?}", report))?;
    let summary = read_summary_json(summary)?;
    let body = truncate_lines(
        &markdown,
        config.report.body_cap_bytes,
        &config.report.truncation_marker,
    );
    let payload = build_notification(&summary, &body.text, ctx);

    let dispatcher = WebhookDispatcher::new(
        WebhookConfig::default()
            .with_timeout(Duration::from_secs(config.notify.timeout_secs))
            .with_retry_backoff(Duration::from_millis(config.notify.retry_backoff_ms))
            .with_limits(PayloadLimits {
                max_body_bytes: config.report.body_cap_bytes,
                max_payload_bytes: config.notify.max_payload_bytes,
            }),
    )
    .context("Failed to build webhook client")?;

    match dispatcher.send(&payload, destination).await {
        Ok(delivery) => {
            METRICS.inc_notifications_sent();
            obs::emit_notify_delivered(delivery.status, delivery.attempts);
            println!("✓ notification delivered ({} attempt(s))", delivery.attempts);
        }
        Err(e) => {
            METRICS.inc_notifications_failed();
            obs::emit_notify_failed(&e);
            println!("! notification not delivered: {e}");
        }
    }
    Ok(Verdict::Passed)
}
