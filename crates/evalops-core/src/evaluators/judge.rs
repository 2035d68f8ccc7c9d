//! LLM-judged relevance and correctness.
//!
//! The judge model is an external collaborator behind [`JudgeModel`]; this
//! module owns the rubric prompt and the parsing of the answer into a score.
//! Output that cannot be parsed is an error, never a default score.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use example_store::{Conversation, ReferenceTrace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::Score;
use crate::domain::{JudgeError, Trace};

/// Longest judge explanation kept as the result reason.
const MAX_REASON_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// Rubric and scale
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rubric {
    /// Does the response address the question?
    Relevance,
    /// Does the response agree with the reference answer?
    Correctness,
    /// Were the right tools used with sensible arguments?
    ToolUsage,
    /// Caller-supplied instructions.
    Custom,
}

/// Declared range of judge scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeScale {
    /// True/False verdict mapped to 1.0/0.0.
    #[default]
    Binary,
    /// Numeric rating clamped into `[min, max]`.
    Rating { min: f64, max: f64 },
}

impl JudgeScale {
    fn instruction(&self) -> String {
        match self {
            JudgeScale::Binary => {
                "Start your answer with exactly one word, True or False, then a one-sentence explanation."
                    .to_string()
            }
            JudgeScale::Rating { min, max } => format!(
                "Start your answer with a single number from {min} to {max}, then a one-sentence explanation."
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Prompt handed to the judge model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgePrompt {
    pub system: String,
    pub user: String,
}

/// External LLM used as a judge.
#[async_trait]
pub trait JudgeModel: Send + Sync {
    /// Return the model's raw text answer for `prompt`.
    async fn complete(&self, prompt: &JudgePrompt) -> Result<String, JudgeError>;
}

/// Judge backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatJudge {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
}

impl OpenAiCompatJudge {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JudgeError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            temperature,
        })
    }
}

#[async_trait]
impl JudgeModel for OpenAiCompatJudge {
    async fn complete(&self, prompt: &JudgePrompt) -> Result<String, JudgeError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| JudgeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(JudgeError::Request(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| JudgeError::Request(format!("invalid response body: {e}")))?;
        raw.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| JudgeError::Request("response has no choices[0].message.content".into()))
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JudgeEvaluator {
    model: Arc<dyn JudgeModel>,
    pub rubric: Rubric,
    pub scale: JudgeScale,
    pub instructions: Option<String>,
}

impl std::fmt::Debug for JudgeEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeEvaluator")
            .field("rubric", &self.rubric)
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

impl JudgeEvaluator {
    pub fn new(model: Arc<dyn JudgeModel>, rubric: Rubric, scale: JudgeScale) -> Self {
        Self {
            model,
            rubric,
            scale,
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub async fn score(
        &self,
        input: &Conversation,
        actual: &Trace,
        reference: &ReferenceTrace,
    ) -> Result<Score, JudgeError> {
        let prompt = self.prompt(input, actual, reference);
        let output = self.model.complete(&prompt).await?;
        parse_judgment(&output, self.scale)
    }

    /// Build the rubric prompt for one example.
    pub fn prompt(
        &self,
        input: &Conversation,
        actual: &Trace,
        reference: &ReferenceTrace,
    ) -> JudgePrompt {
        let task = match (self.rubric, self.instructions.as_deref()) {
            (_, Some(custom)) => custom.to_string(),
            (Rubric::Relevance, None) => {
                "Judge whether the response directly addresses the user's question.".to_string()
            }
            (Rubric::Correctness, None) => {
                "Judge whether the response is factually consistent with the reference answer."
                    .to_string()
            }
            (Rubric::ToolUsage, None) => {
                "Judge whether the agent called the right tools with appropriate arguments compared to the reference tool calls."
                    .to_string()
            }
            (Rubric::Custom, None) => "Judge the quality of the response.".to_string(),
        };
        let system = format!(
            "You are an impartial evaluator of AI agent responses. {task} {}",
            self.scale.instruction()
        );

        let question = input.last_user_message().unwrap_or("");
        let mut user = format!(
            "Question:\n{question}\n\nResponse:\n{}\n\nReference answer:\n{}\n",
            actual.final_response(),
            reference.expected_response
        );
        if self.rubric == Rubric::ToolUsage {
            let fmt_calls = |calls: Vec<&example_store::ToolCall>| {
                calls
                    .iter()
                    .map(|c| format!("- {}({})", c.name, Value::Object(c.arguments.clone())))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            user.push_str(&format!(
                "\nAgent tool calls:\n{}\n\nReference tool calls:\n{}\n",
                fmt_calls(actual.tool_calls().collect()),
                fmt_calls(reference.tool_calls.iter().collect())
            ));
        }
        JudgePrompt { system, user }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Turn a judge answer into a score on `scale`.
///
/// A JSON object with a `score` field is accepted first. Otherwise a binary
/// scale reads the leading verdict word and a rating scale reads the first
/// number in the text.
pub fn parse_judgment(output: &str, scale: JudgeScale) -> Result<Score, JudgeError> {
    let parse_error = || JudgeError::Parse {
        output: output.to_string(),
    };
    let text = output.trim();
    if text.is_empty() {
        return Err(parse_error());
    }

    if let Some(score) = parse_structured(text, scale) {
        return Ok(score);
    }

    let value = match scale {
        JudgeScale::Binary => binary_verdict(text).ok_or_else(parse_error)?,
        JudgeScale::Rating { min, max } => first_number(text)
            .map(|n| n.clamp(min, max))
            .ok_or_else(parse_error)?,
    };
    Ok(Score {
        value,
        reason: shorten(text),
    })
}

fn parse_structured(text: &str, scale: JudgeScale) -> Option<Score> {
    let body = text
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let raw: Value = serde_json::from_str(body).ok()?;
    let obj = raw.as_object()?;
    let score = obj.get("score")?;
    let value = match (score, scale) {
        (Value::Bool(b), _) => f64::from(u8::from(*b)),
        (Value::Number(n), JudgeScale::Binary) => n.as_f64()?.clamp(0.0, 1.0),
        (Value::Number(n), JudgeScale::Rating { min, max }) => n.as_f64()?.clamp(min, max),
        (Value::String(s), JudgeScale::Binary) => binary_verdict(s)?,
        _ => return None,
    };
    let reason = ["reason", "explanation", "reasoning"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(shorten)
        .unwrap_or_else(|| shorten(text));
    Some(Score { value, reason })
}

fn binary_verdict(text: &str) -> Option<f64> {
    let word: String = text
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    match word.as_str() {
        "true" | "correct" | "yes" | "pass" | "relevant" => Some(1.0),
        "false" | "incorrect" | "no" | "fail" | "irrelevant" => Some(0.0),
        _ => None,
    }
}

fn first_number(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NUMBER
        .get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").ok())
        .as_ref()?;
    re.find(text)?.as_str().parse().ok()
}

fn shorten(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_REASON_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(MAX_REASON_CHARS).collect();
    cut.push('…');
    cut
}
