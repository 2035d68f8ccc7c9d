//! Example sources backing the refresh fetch function.
//!
//! A source yields seed records `{question, response, expected_tools}`.
//! `{today}` placeholders are replaced with the refresh date so reference
//! data regenerated daily stays date-consistent.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use example_store::{Conversation, NewExample, ReferenceTrace, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::FetchError;

const TODAY: &str = "{today}";

/// Seed record as published by upstream data fetchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleSeed {
    pub question: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub expected_tools: Vec<ToolCall>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ExampleSeed {
    /// Materialize the seed for `date`.
    pub fn into_example(self, date: NaiveDate) -> NewExample {
        let today = date.format("%Y-%m-%d").to_string();
        let expected_tools = self
            .expected_tools
            .into_iter()
            .map(|mut call| {
                for value in call.arguments.values_mut() {
                    substitute(value, &today);
                }
                call
            })
            .collect();

        let mut metadata = self.metadata;
        metadata.insert("source_date".to_string(), Value::String(today.clone()));

        NewExample {
            input: Conversation::user(self.question.replace(TODAY, &today)),
            reference: ReferenceTrace {
                tool_calls: expected_tools,
                expected_response: self.response.replace(TODAY, &today),
            },
            metadata,
        }
    }
}

fn substitute(value: &mut Value, today: &str) {
    match value {
        Value::String(s) if s.contains(TODAY) => *s = s.replace(TODAY, today),
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, today)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, today)),
        _ => {}
    }
}

/// Parse a JSON seed list.
pub fn parse_seeds(origin: &str, raw: &str) -> Result<Vec<ExampleSeed>, FetchError> {
    serde_json::from_str(raw).map_err(|e| FetchError::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    })
}

/// Upstream provider of reference examples.
#[async_trait]
pub trait ExampleSource: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<NewExample>, FetchError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// Seed list stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileExampleSource {
    path: PathBuf,
}

impl FileExampleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ExampleSource for FileExampleSource {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<NewExample>, FetchError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FetchError::Io {
                path: self.path.clone(),
                source,
            })?;
        let seeds = parse_seeds(&self.describe(), &raw)?;
        Ok(seeds.into_iter().map(|s| s.into_example(date)).collect())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Seed list served over HTTP(S).
pub struct HttpExampleSource {
    client: reqwest::Client,
    url: String,
}

impl HttpExampleSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ExampleSource for HttpExampleSource {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<NewExample>, FetchError> {
        let http_err = |e: reqwest::Error| FetchError::Http {
            url: self.url.clone(),
            message: e.to_string(),
        };
        let response = self.client.get(&self.url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let raw = response.text().await.map_err(http_err)?;
        let seeds = parse_seeds(&self.url, &raw)?;
        Ok(seeds.into_iter().map(|s| s.into_example(date)).collect())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Pick a source for a configured location: http(s) URLs are fetched, anything
/// else is a file path resolved against `base_dir`.
pub fn source_for(
    location: &str,
    base_dir: &std::path::Path,
    timeout: Duration,
) -> Result<Box<dyn ExampleSource>, FetchError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Ok(Box::new(HttpExampleSource::new(location, timeout)?));
    }
    Ok(Box::new(FileExampleSource::new(base_dir.join(location))))
}
