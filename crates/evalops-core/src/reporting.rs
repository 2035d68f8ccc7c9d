use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webhook_notify::NotificationPayload;

use crate::aggregate::{aggregate, AggregateReport};
use crate::domain::{ConfigError, EvaluationResult};
use crate::threshold::{Threshold, Thresholds};

pub const SCHEMA_VERSION: &str = "1.0";

/// Longest example reason rendered in the markdown report.
const MAX_REASON_CHARS: usize = 160;

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Per-suite results file (`<suite>.results.json`). Carries its thresholds so
/// reports can be regenerated from the file alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunArtifact {
    pub schema_version: String,
    pub run_id: Uuid,
    pub suite: String,
    pub agent: String,
    pub dataset: String,
    pub generation_tag: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub thresholds: Thresholds,
    pub results: Vec<EvaluationResult>,
}

/// Metric entry of `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSummaryArtifact {
    pub mean: f64,
    pub threshold: Threshold,
    pub passed: bool,
    pub pass_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteSummaryArtifact {
    pub suite: String,
    pub metrics: BTreeMap<String, MetricSummaryArtifact>,
    pub overall_passed: bool,
    pub examples_evaluated: usize,
}

/// Machine-readable summary (`summary.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub overall_passed: bool,
    pub suites: Vec<SuiteSummaryArtifact>,
}

impl SummaryArtifact {
    pub fn from_reports(reports: &[SuiteReport], generated_at: DateTime<Utc>) -> Self {
        let suites: Vec<SuiteSummaryArtifact> = reports
            .iter()
            .map(|r| SuiteSummaryArtifact {
                suite: r.suite.clone(),
                metrics: r
                    .aggregate
                    .metrics
                    .iter()
                    .map(|m| {
                        (
                            m.metric.clone(),
                            MetricSummaryArtifact {
                                mean: m.mean_score,
                                threshold: m.threshold,
                                passed: m.passed,
                                pass_count: m.pass_count,
                                total_count: m.total_count,
                            },
                        )
                    })
                    .collect(),
                overall_passed: r.aggregate.overall_passed,
                examples_evaluated: r.aggregate.examples_evaluated,
            })
            .collect();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at,
            overall_passed: !suites.is_empty() && suites.iter().all(|s| s.overall_passed),
            suites,
        }
    }
}

// ---------------------------------------------------------------------------
// Suite report
// ---------------------------------------------------------------------------

/// Aggregated view of one suite run, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteReport {
    pub suite: String,
    pub agent: String,
    pub dataset: String,
    pub generation_tag: String,
    pub cancelled: bool,
    pub aggregate: AggregateReport,
    /// Results that did not pass, sorted by (example id, metric).
    pub failures: Vec<EvaluationResult>,
}

impl SuiteReport {
    pub fn from_run(run: &RunArtifact) -> Result<Self, ConfigError> {
        let aggregate = aggregate(&run.results, &run.thresholds)?;
        let mut failures: Vec<EvaluationResult> =
            run.results.iter().filter(|r| !r.passed).cloned().collect();
        failures.sort_by(|a, b| {
            a.example_id
                .cmp(&b.example_id)
                .then_with(|| a.metric.cmp(&b.metric))
        });
        Ok(Self {
            suite: run.suite.clone(),
            agent: run.agent.clone(),
            dataset: run.dataset.clone(),
            generation_tag: run.generation_tag.clone(),
            cancelled: run.cancelled,
            aggregate,
            failures,
        })
    }
}

/// Human description of a metric; keyword fallbacks cover custom names.
pub fn metric_description(metric: &str) -> &'static str {
    match metric {
        "trajectory" | "trajectory_unordered_match" => {
            "Measures if the agent called the correct tools regardless of order"
        }
        "trajectory_exact_match" | "trajectory_strict" => {
            "Measures if the agent called the exact sequence of tools"
        }
        "correctness" | "response_correctness" => {
            "LLM judge evaluation of response accuracy compared to reference"
        }
        "relevance" | "response_relevance" => {
            "LLM judge evaluation of response relevance to the question"
        }
        "tool_args" | "tool_args_match_score" => "Measures accuracy of tool names and arguments used",
        "argument_correctness" => "Evaluates if tool arguments match expected values",
        _ => {
            let key = metric.to_ascii_lowercase();
            if key.contains("trajectory") {
                "Evaluates the sequence of tools called by the agent"
            } else if key.contains("correctness") || key.contains("accuracy") {
                "Evaluates response accuracy"
            } else if key.contains("relevance") {
                "Evaluates response relevance"
            } else if key.contains("tool") && key.contains("arg") {
                "Evaluates tool usage and arguments"
            } else {
                "Custom evaluation metric"
            }
        }
    }
}

fn glyph(passed: bool) -> &'static str {
    if passed {
        "✅"
    } else {
        "❌"
    }
}

fn one_line(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_REASON_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(MAX_REASON_CHARS).collect();
    cut.push('…');
    cut
}

/// Render the full markdown report. Output depends only on the input.
pub fn render_report_md(reports: &[SuiteReport]) -> String {
    let overall = !reports.is_empty() && reports.iter().all(|r| r.aggregate.overall_passed);
    let mut out = String::new();
    out.push_str("# Agent Evaluation Results\n\n");
    out.push_str(&format!(
        "**Overall:** {} {}\n\n",
        glyph(overall),
        if overall { "PASSED" } else { "FAILED" }
    ));

    for r in reports {
        out.push_str(&format!(
            "## {} {} (agent `{}`)\n",
            glyph(r.aggregate.overall_passed),
            r.suite,
            r.agent
        ));
        out.push_str(&format!(
            "- dataset: `{}` @ `{}`\n- examples: {}\n",
            r.dataset, r.generation_tag, r.aggregate.examples_evaluated
        ));
        if r.cancelled {
            out.push_str("- ⚠️ run cancelled before all examples started\n");
        }
        out.push('\n');

        for m in &r.aggregate.metrics {
            out.push_str(&format!(
                "- {} **{}**: {:.2} (threshold {}, {}/{} passed) — {}\n",
                glyph(m.passed),
                m.metric,
                m.mean_score,
                m.threshold,
                m.pass_count,
                m.total_count,
                metric_description(&m.metric)
            ));
        }
        out.push('\n');

        if !r.failures.is_empty() {
            out.push_str("### Failing examples\n");
            for f in &r.failures {
                out.push_str(&format!(
                    "- `{}` {}: {:.2} {}\n",
                    f.example_id.short(),
                    f.metric,
                    f.score,
                    one_line(&f.reason)
                ));
            }
            out.push('\n');
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

/// Result of [`truncate_lines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub text: String,
    pub truncated: bool,
}

/// Bound `text` to `cap_bytes`, cutting on whole-line boundaries.
///
/// When anything is cut, `marker` is appended on its own line and counts
/// against the cap. If not even the marker fits the result is empty.
pub fn truncate_lines(text: &str, cap_bytes: usize, marker: &str) -> Truncated {
    if text.len() <= cap_bytes {
        return Truncated {
            text: text.to_string(),
            truncated: false,
        };
    }
    if marker.len() > cap_bytes {
        return Truncated {
            text: String::new(),
            truncated: true,
        };
    }

    let budget = cap_bytes - marker.len();
    let mut out = String::new();
    for line in text.split_inclusive('\n') {
        // A kept line must end in '\n' so the marker starts a new line.
        if !line.ends_with('\n') || out.len() + line.len() > budget {
            break;
        }
        out.push_str(line);
    }
    out.push_str(marker);
    Truncated {
        text: out,
        truncated: true,
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Write `<suite>.results.json` in pretty JSON format.
pub fn write_run_json(path: &Path, artifact: &RunArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize run artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

pub fn read_run_json(path: &Path) -> Result<RunArtifact> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
}

pub fn write_summary_json(path: &Path, artifact: &SummaryArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize summary")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

pub fn read_summary_json(path: &Path) -> Result<SummaryArtifact> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
}

/// Paths written by [`write_report_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub report_md: PathBuf,
    pub truncated_md: PathBuf,
    pub summary_json: PathBuf,
}

/// Write `report.md`, `report.truncated.md` and `summary.json` into `out_dir`.
pub fn write_report_artifacts(
    out_dir: &Path,
    reports: &[SuiteReport],
    body_cap_bytes: usize,
    marker: &str,
) -> Result<(SummaryArtifact, ReportFiles)> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("create {:?}", out_dir))?;
    let files = ReportFiles {
        report_md: out_dir.join("report.md"),
        truncated_md: out_dir.join("report.truncated.md"),
        summary_json: out_dir.join("summary.json"),
    };

    let full = render_report_md(reports);
    let bounded = truncate_lines(&full, body_cap_bytes, marker);
    std::fs::write(&files.report_md, &full)
        .with_context(|| format!("write {:?}", files.report_md))?;
    std::fs::write(&files.truncated_md, &bounded.text)
        .with_context(|| format!("write {:?}", files.truncated_md))?;

    let summary = SummaryArtifact::from_reports(reports, Utc::now());
    write_summary_json(&files.summary_json, &summary)?;
    Ok((summary, files))
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// CI context shown in the notification summary block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyContext {
    pub branch: Option<String>,
    pub actor: Option<String>,
    pub repository: Option<String>,
    pub run_id: Option<String>,
    pub results_url: Option<String>,
}

/// Build the webhook payload for a summary and an already-bounded body.
pub fn build_notification(
    summary: &SummaryArtifact,
    body: &str,
    ctx: &NotifyContext,
) -> NotificationPayload {
    let header = format!(
        "{} Agent evaluation {}",
        glyph(summary.overall_passed),
        if summary.overall_passed { "passed" } else { "failed" }
    );
    let suites = summary
        .suites
        .iter()
        .map(|s| format!("{} {}", glyph(s.overall_passed), s.suite))
        .collect::<Vec<_>>()
        .join(", ");

    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    let mut payload = NotificationPayload::new(header, body)
        .with_field("Branch", field(&ctx.branch))
        .with_field("Actor", field(&ctx.actor))
        .with_field("Repository", field(&ctx.repository))
        .with_field("Run", field(&ctx.run_id))
        .with_field("Suites", suites);
    if let Some(url) = &ctx.results_url {
        payload = payload.with_action("View full results", url.clone());
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureKind;
    use example_store::ExampleId;

    fn run() -> RunArtifact {
        let id = |c: &str| ExampleId::from(c.repeat(64));
        let result = |e: &str, metric: &str, score: f64, passed: bool, reason: &str| EvaluationResult {
            example_id: id(e),
            metric: metric.to_string(),
            score,
            passed,
            reason: reason.to_string(),
            failure: None,
        };
        let mut failed = result("b", "relevance", 0.0, false, "judge said:\nFalse");
        failed.failure = Some(FailureKind::JudgeParse);
        RunArtifact {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").expect("uuid"),
            suite: "market".to_string(),
            agent: "market-agent".to_string(),
            dataset: "market-data".to_string(),
            generation_tag: "daily-2026-01-01".to_string(),
            started_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("rfc3339")
                .with_timezone(&Utc),
            finished_at: DateTime::parse_from_rfc3339("2026-01-01T00:01:00Z")
                .expect("rfc3339")
                .with_timezone(&Utc),
            cancelled: false,
            thresholds: Thresholds::new()
                .with("trajectory", Threshold::at_least(0.5))
                .with("relevance", Threshold::at_least(0.8)),
            results: vec![
                result("a", "trajectory", 1.0, true, "2/2 tools in common"),
                result("a", "relevance", 1.0, true, "True"),
                result("b", "trajectory", 1.0 / 3.0, false, "1/3 tools in common"),
                failed,
            ],
        }
    }

    #[test]
    fn markdown_render_is_stable() {
        let report = SuiteReport::from_run(&run()).unwrap();
        let actual = render_report_md(&[report]);
        let expected = "# Agent Evaluation Results\n\n\
**Overall:** ❌ FAILED\n\n\
## ❌ market (agent `market-agent`)\n\
- dataset: `market-data` @ `daily-2026-01-01`\n\
- examples: 2\n\n\
- ✅ **trajectory**: 0.67 (threshold >=0.50, 1/2 passed) — Measures if the agent called the correct tools regardless of order\n\
- ❌ **relevance**: 0.50 (threshold >=0.80, 1/2 passed) — LLM judge evaluation of response relevance to the question\n\n\
### Failing examples\n\
- `bbbbbbbbbbbb` relevance: 0.00 judge said: False\n\
- `bbbbbbbbbbbb` trajectory: 0.33 1/3 tools in common\n\n";
        assert_eq!(actual, expected);
    }

    #[test]
    fn summary_schema_has_expected_keys() {
        let report = SuiteReport::from_run(&run()).unwrap();
        let summary = SummaryArtifact::from_reports(&[report], Utc::now());
        let raw = serde_json::to_value(&summary).unwrap();
        assert_eq!(raw["overall_passed"], false);
        let suite = &raw["suites"][0];
        assert_eq!(suite["examples_evaluated"], 2);
        assert_eq!(suite["metrics"]["relevance"]["threshold"], ">=0.8");
        assert_eq!(suite["metrics"]["relevance"]["passed"], false);
        assert_eq!(suite["metrics"]["trajectory"]["total_count"], 2);
    }

    #[test]
    fn metric_description_fallbacks() {
        assert_eq!(
            metric_description("tool_args_quality"),
            "Evaluates tool usage and arguments"
        );
        assert_eq!(metric_description("answer_accuracy"), "Evaluates response accuracy");
        assert_eq!(metric_description("latency"), "Custom evaluation metric");
    }

    #[test]
    fn truncation_short_text_is_untouched() {
        let t = truncate_lines("a\nb\n", 100, "[cut]");
        assert_eq!(t.text, "a\nb\n");
        assert!(!t.truncated);
    }

    #[test]
    fn truncation_marker_larger_than_cap_yields_empty() {
        let t = truncate_lines("aaaa\nbbbb\n", 3, "[truncated]");
        assert_eq!(t.text, "");
        assert!(t.truncated);
    }

    #[test]
    fn notification_includes_context_and_link() {
        let report = SuiteReport::from_run(&run()).unwrap();
        let summary = SummaryArtifact::from_reports(&[report], Utc::now());
        let ctx = NotifyContext {
            branch: Some("main".into()),
            actor: Some("ci-bot".into()),
            repository: None,
            run_id: Some("42".into()),
            results_url: Some("https://ci.example.com/runs/42".into()),
        };
        let payload = build_notification(&summary, "body", &ctx);
        assert_eq!(payload.header, "❌ Agent evaluation failed");
        let labels: Vec<_> = payload.fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Branch", "Actor", "Run", "Suites"]);
        assert_eq!(payload.action.unwrap().url, "https://ci.example.com/runs/42");
    }

    #[test]
    fn run_artifact_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.results.json");
        write_run_json(&path, &run()).unwrap();
        assert_eq!(read_run_json(&path).unwrap(), run());
    }
}
