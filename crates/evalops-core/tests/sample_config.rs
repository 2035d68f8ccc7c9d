//! The checked-in sample configuration and seed files stay loadable.

use chrono::NaiveDate;
use evalops_core::{EvalConfig, EvaluatorKind, ExampleSource, FileExampleSource, JudgeScale};

const SAMPLE: &str = include_str!("../../../evalops.toml");

fn repo_root() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[test]
fn sample_config_validates() {
    let cfg = EvalConfig::from_toml_str(SAMPLE).unwrap();
    assert_eq!(cfg.suites.len(), 2);
    assert_eq!(cfg.report.body_cap_bytes, 1200);

    let portfolio = cfg.suite("portfolio").unwrap();
    let quality = portfolio
        .evaluators
        .iter()
        .find(|e| e.metric == "tool_args_quality")
        .unwrap();
    assert!(matches!(
        quality.kind,
        EvaluatorKind::Judge {
            scale: JudgeScale::Rating { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn sample_datasets_parse() {
    let cfg = EvalConfig::from_toml_str(SAMPLE).unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
    for ds in &cfg.datasets {
        let source = FileExampleSource::new(repo_root().join(&ds.source));
        let examples = source.fetch(date).await.unwrap();
        assert!(!examples.is_empty(), "{} is empty", ds.name);
        assert!(examples
            .iter()
            .all(|e| !e.input.last_user_message().unwrap_or("").contains("{today}")));
    }
}
