//! Error taxonomy for the evaluation pipeline.
//!
//! Errors local to one example (`InvocationError`, `JudgeError`) are folded
//! into zero-score results. Errors touching shared state (`RefreshError`,
//! `ConfigError`, `SnapshotError`) abort the command.

use std::path::PathBuf;

use example_store::StoreError;

/// Upstream example data could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to read example source {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("example source {url} unreachable: {message}")]
    Http { url: String, message: String },

    #[error("example source {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("example source {origin} is not a valid seed list: {message}")]
    Parse { origin: String, message: String },
}

/// Failure of a dataset refresh.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("fetching examples for {dataset} failed: {source}")]
    Fetch {
        dataset: String,
        #[source]
        source: FetchError,
    },

    #[error("fetch for {dataset} returned no examples; dataset left untouched")]
    EmptyFetch { dataset: String },

    #[error("fetch for {dataset} returned {duplicates} duplicate examples (first {first}); dataset left untouched")]
    DuplicateExamples {
        dataset: String,
        duplicates: usize,
        first: String,
    },

    #[error("generation tag {tag} already present in {dataset}")]
    TagCollision { dataset: String, tag: String },

    #[error("listing {dataset} failed: {source}")]
    List {
        dataset: String,
        #[source]
        source: StoreError,
    },

    #[error("deleting {count} examples from {dataset} failed: {source}")]
    Delete {
        dataset: String,
        count: usize,
        #[source]
        source: StoreError,
    },

    #[error("CRITICAL: {dataset} is empty, {deleted} examples deleted but creating the new generation failed: {source}")]
    CreateAfterDelete {
        dataset: String,
        deleted: usize,
        #[source]
        source: StoreError,
    },

    #[error("atomic replace of {dataset} failed: {source}")]
    Replace {
        dataset: String,
        #[source]
        source: StoreError,
    },
}

impl RefreshError {
    /// True when the refresh left the dataset without examples.
    pub fn is_critical(&self) -> bool {
        matches!(self, RefreshError::CreateAfterDelete { .. })
    }

    /// True when the dataset was not mutated at all.
    pub fn left_unchanged(&self) -> bool {
        !matches!(
            self,
            RefreshError::CreateAfterDelete { .. } | RefreshError::Delete { .. }
        )
    }
}

/// The agent call failed. Never retried at the invocation layer.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("agent runtime error: {0}")]
    Runtime(String),

    #[error("agent invocation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("malformed agent response: {0}")]
    Malformed(String),
}

/// The LLM judge could not produce a usable score.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge request failed: {0}")]
    Request(String),

    #[error("unparsable judge output: {output:?}")]
    Parse { output: String },
}

/// Configuration is missing or malformed. Raised before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("suite {suite}: metric {metric} has no threshold")]
    MissingThreshold { suite: String, metric: String },

    #[error("metric {metric} has results but no configured threshold")]
    UnconfiguredMetric { metric: String },

    #[error("suite {suite}: metric {metric} declared twice")]
    DuplicateMetric { suite: String, metric: String },

    #[error("suite {suite} references unknown dataset {dataset}")]
    UnknownDataset { suite: String, dataset: String },

    #[error("unknown suite {0}")]
    UnknownSuite(String),

    #[error("suite {suite} uses a judge evaluator but no [judge] section is configured")]
    JudgeNotConfigured { suite: String },

    #[error("invalid threshold {0:?}")]
    InvalidThreshold(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The example set for a run could not be materialized.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("listing {dataset} failed: {source}")]
    Store {
        dataset: String,
        #[source]
        source: StoreError,
    },

    #[error("dataset {dataset} has no examples")]
    Empty { dataset: String },

    #[error("dataset {dataset} mixes generations: {tags:?}")]
    MixedGenerations { dataset: String, tags: Vec<String> },

    #[error("dataset {dataset} is at generation {found}, expected {expected}")]
    GenerationMismatch {
        dataset: String,
        expected: String,
        found: String,
    },
}
