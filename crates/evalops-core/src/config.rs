//! Pipeline configuration.
//!
//! Loaded once from TOML into an immutable [`EvalConfig`] and validated
//! before any network activity. Everything downstream borrows it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use example_store::is_valid_dataset_name;
use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::evaluators::{JudgeScale, Rubric, TrajectoryMode};
use crate::threshold::{Threshold, Thresholds};

pub const DEFAULT_TAG_FORMAT: &str = "daily-%Y-%m-%d";
pub const DEFAULT_BODY_CAP_BYTES: usize = 1200;
pub const DEFAULT_TRUNCATION_MARKER: &str = "… (report truncated)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvalConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub judge: Option<JudgeConfig>,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub suites: Vec<SuiteConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".evalops/store"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub endpoint: String,
    #[serde(default = "default_runtime_timeout")]
    pub timeout_secs: u64,
}

fn default_runtime_timeout() -> u64 {
    60
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/invoke".to_string(),
            timeout_secs: default_runtime_timeout(),
        }
    }
}

impl RuntimeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_judge_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f64,
}

fn default_judge_timeout() -> u64 {
    30
}

impl JudgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_tag_format")]
    pub generation_tag_format: String,
}

fn default_tag_format() -> String {
    DEFAULT_TAG_FORMAT.to_string()
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            generation_tag_format: default_tag_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_body_cap")]
    pub body_cap_bytes: usize,
    #[serde(default = "default_marker")]
    pub truncation_marker: String,
    /// Link to full results, used as the notification action.
    #[serde(default)]
    pub results_url: Option<String>,
}

fn default_body_cap() -> usize {
    DEFAULT_BODY_CAP_BYTES
}

fn default_marker() -> String {
    DEFAULT_TRUNCATION_MARKER.to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            body_cap_bytes: default_body_cap(),
            truncation_marker: default_marker(),
            results_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
}

fn default_notify_timeout() -> u64 {
    10
}

fn default_retry_backoff() -> u64 {
    2000
}

fn default_max_payload() -> usize {
    4000
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_notify_timeout(),
            retry_backoff_ms: default_retry_backoff(),
            max_payload_bytes: default_max_payload(),
        }
    }
}

/// A dataset and where its examples come from (file path or http(s) URL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    pub name: String,
    pub agent: String,
    pub dataset: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub evaluators: Vec<EvaluatorConfig>,
}

fn default_concurrency() -> usize {
    10
}

impl SuiteConfig {
    /// Configured thresholds in declaration order. Metrics without a
    /// threshold are skipped; validation rejects them earlier.
    pub fn thresholds(&self) -> Thresholds {
        let mut t = Thresholds::new();
        for e in &self.evaluators {
            if let Some(threshold) = e.threshold {
                t.insert(e.metric.clone(), threshold);
            }
        }
        t
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub metric: String,
    #[serde(default)]
    pub threshold: Option<Threshold>,
    #[serde(flatten)]
    pub kind: EvaluatorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluatorKind {
    Trajectory {
        #[serde(default)]
        mode: TrajectoryMode,
    },
    ToolArgs {
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
    Judge {
        rubric: Rubric,
        #[serde(default)]
        scale: JudgeScale,
        #[serde(default)]
        instructions: Option<String>,
    },
}

fn default_tolerance() -> f64 {
    crate::evaluators::value_eq::DEFAULT_TOLERANCE
}

impl EvalConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EvalConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_tag_format(&self.refresh.generation_tag_format)?;

        if self.report.body_cap_bytes <= self.report.truncation_marker.len() {
            return Err(ConfigError::Invalid(format!(
                "report.body_cap_bytes ({}) must exceed the truncation marker length ({})",
                self.report.body_cap_bytes,
                self.report.truncation_marker.len()
            )));
        }
        if self.notify.max_payload_bytes < self.report.body_cap_bytes {
            return Err(ConfigError::Invalid(
                "notify.max_payload_bytes must be at least report.body_cap_bytes".to_string(),
            ));
        }

        let mut dataset_names = HashSet::new();
        for d in &self.datasets {
            if !is_valid_dataset_name(&d.name) {
                return Err(ConfigError::Invalid(format!("invalid dataset name {:?}", d.name)));
            }
            if !dataset_names.insert(d.name.as_str()) {
                return Err(ConfigError::Invalid(format!("dataset {} declared twice", d.name)));
            }
        }

        let mut suite_names = HashSet::new();
        for s in &self.suites {
            if !suite_names.insert(s.name.as_str()) {
                return Err(ConfigError::Invalid(format!("suite {} declared twice", s.name)));
            }
            if !dataset_names.contains(s.dataset.as_str()) {
                return Err(ConfigError::UnknownDataset {
                    suite: s.name.clone(),
                    dataset: s.dataset.clone(),
                });
            }
            if s.concurrency == 0 {
                return Err(ConfigError::Invalid(format!(
                    "suite {}: concurrency must be at least 1",
                    s.name
                )));
            }
            if s.evaluators.is_empty() {
                return Err(ConfigError::Invalid(format!("suite {} has no evaluators", s.name)));
            }

            let mut metrics = HashSet::new();
            for e in &s.evaluators {
                if !metrics.insert(e.metric.as_str()) {
                    return Err(ConfigError::DuplicateMetric {
                        suite: s.name.clone(),
                        metric: e.metric.clone(),
                    });
                }
                if e.threshold.is_none() {
                    return Err(ConfigError::MissingThreshold {
                        suite: s.name.clone(),
                        metric: e.metric.clone(),
                    });
                }
                match &e.kind {
                    EvaluatorKind::Judge {
                        rubric,
                        scale,
                        instructions,
                    } => {
                        if self.judge.is_none() {
                            return Err(ConfigError::JudgeNotConfigured {
                                suite: s.name.clone(),
                            });
                        }
                        if *rubric == Rubric::Custom && instructions.is_none() {
                            return Err(ConfigError::Invalid(format!(
                                "suite {}: custom rubric for {} needs instructions",
                                s.name, e.metric
                            )));
                        }
                        if let JudgeScale::Rating { min, max } = scale {
                            if min >= max {
                                return Err(ConfigError::Invalid(format!(
                                    "suite {}: rating scale for {} needs min < max",
                                    s.name, e.metric
                                )));
                            }
                        }
                    }
                    EvaluatorKind::ToolArgs { tolerance } if *tolerance < 0.0 => {
                        return Err(ConfigError::Invalid(format!(
                            "suite {}: negative tolerance for {}",
                            s.name, e.metric
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    pub fn suite(&self, name: &str) -> Result<&SuiteConfig, ConfigError> {
        self.suites
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownSuite(name.to_string()))
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.name == name)
    }
}

fn validate_tag_format(format: &str) -> Result<(), ConfigError> {
    if format.trim().is_empty() {
        return Err(ConfigError::Invalid("generation_tag_format is empty".to_string()));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::Invalid(format!(
            "invalid generation_tag_format {format:?}"
        )));
    }
    Ok(())
}
