//! Schema definitions for reference dataset examples
//!
//! - `ToolCall`: a single tool invocation (name + argument mapping)
//! - `Conversation`: the conversation seed handed to an agent
//! - `ReferenceTrace`: expected tool invocations and final response
//! - `NewExample` / `Example`: an example before and after it is stored

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A single tool invocation with its argument mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, alias = "args")]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" | "human" => Ok(Role::User),
            "assistant" | "ai" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One message of a conversation seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Conversation seed used as the input of an example.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Single-turn conversation holding one user question.
    pub fn user(question: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: Role::User,
                content: question.into(),
            }],
        }
    }

    /// Content of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Expected behaviour for an example.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrace {
    /// Expected tool invocations, in the order the reference agent made them.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Expected final response.
    #[serde(default)]
    pub expected_response: String,
}

/// An example as produced by a fetch function, before it is tagged and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExample {
    pub input: Conversation,
    pub reference: ReferenceTrace,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Content-derived example identifier (SHA-256 hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleId(String);

impl ExampleId {
    /// Derive the id of `example` stored in `dataset` under `generation_tag`.
    ///
    /// Hashes the canonical JSON of the content; object keys are already
    /// sorted because `serde_json::Map` is a `BTreeMap` here.
    pub fn derive(dataset: &str, generation_tag: &str, example: &NewExample) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"D");
        hasher.update(dataset.as_bytes());
        hasher.update(b"\0G");
        hasher.update(generation_tag.as_bytes());
        hasher.update(b"\0I");
        hasher.update(serde_json::to_vec(&example.input).unwrap_or_default());
        hasher.update(b"\0R");
        hasher.update(serde_json::to_vec(&example.reference).unwrap_or_default());
        ExampleId(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 chars). Ids read back from results files are not
    /// guaranteed to be hex, so the cut lands on a char boundary.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl From<String> for ExampleId {
    fn from(s: String) -> Self {
        ExampleId(s)
    }
}

impl std::fmt::Display for ExampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored, immutable reference example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: ExampleId,
    pub dataset: String,
    pub generation_tag: String,
    pub input: Conversation,
    pub reference: ReferenceTrace,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Example {
    /// Tag a new example for storage in `dataset`.
    pub fn from_new(dataset: &str, generation_tag: &str, new: NewExample) -> Self {
        let id = ExampleId::derive(dataset, generation_tag, &new);
        Self {
            id,
            dataset: dataset.to_string(),
            generation_tag: generation_tag.to_string(),
            input: new.input,
            reference: new.reference,
            metadata: new.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Dataset names addressable by every backend: `[A-Za-z0-9._-]`, non-empty,
/// not starting with a dot.
pub fn is_valid_dataset_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
