//! Interaction trace recorded for one agent invocation.

use std::collections::BTreeSet;

use example_store::{Role, ToolCall};
use serde::{Deserialize, Serialize};

/// One message of the interaction, with the tool calls it issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl TraceEvent {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }
}

/// Ordered sequence of events produced by one agent invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new(events: Vec<TraceEvent>) -> Self {
        Self { events }
    }

    /// All tool calls in invocation order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.events.iter().flat_map(|e| e.tool_calls.iter())
    }

    /// Distinct tool names invoked (presence, not multiplicity).
    pub fn tool_names(&self) -> BTreeSet<&str> {
        self.tool_calls().map(|c| c.name.as_str()).collect()
    }

    /// The agent's final answer.
    ///
    /// Last assistant message that issued no tool calls; falls back to the
    /// content of the last event.
    pub fn final_response(&self) -> &str {
        self.events
            .iter()
            .rev()
            .find(|e| e.role == Role::Assistant && e.tool_calls.is_empty())
            .or_else(|| self.events.last())
            .map(|e| e.content.as_str())
            .unwrap_or("")
    }
}
